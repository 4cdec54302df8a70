//! Pluggable replacement shim: multiple policies may be registered; for
//! `find_victim` the *last* registered policy's decision wins, but every
//! policy sees every `update` call.
//!
//! Grounded on ChampSim's `champsim::detail::take_last` dispatch in
//! `cache.h` and the stock LRU body in
//! `examples/original_source/source/ChampSim/replacement/lru/lru.cc`.

pub mod drrip;
pub mod lru;
pub mod ship;
pub mod srrip;

use crate::address::Address;
use crate::mem_fetch::AccessType;

/// A read-only view of one set's occupants, as passed to `find_victim`.
pub struct SetView<'a> {
    pub tags: &'a [Option<u64>],
}

pub trait ReplacementPolicy {
    fn name(&self) -> &'static str;

    fn initialize(&mut self) {}

    fn find_victim(
        &mut self,
        cpu: usize,
        instr_id: u64,
        set: usize,
        set_view: &SetView,
        ip: Address,
        full_addr: Address,
        r#type: AccessType,
    ) -> usize;

    fn update(
        &mut self,
        cpu: usize,
        set: usize,
        way: usize,
        full_addr: Address,
        ip: Address,
        victim_addr: Address,
        r#type: AccessType,
        hit: bool,
    );

    fn final_stats(&self) {}
}

/// Invokes a list of registered policies; `find_victim` returns the last
/// policy's verdict, `update` is broadcast to all.
pub struct ReplacementShim {
    policies: Vec<Box<dyn ReplacementPolicy>>,
}

impl ReplacementShim {
    pub fn new(policies: Vec<Box<dyn ReplacementPolicy>>) -> Self {
        assert!(!policies.is_empty(), "replacement shim needs at least one policy");
        Self { policies }
    }

    pub fn initialize(&mut self) {
        for p in &mut self.policies {
            p.initialize();
        }
    }

    pub fn find_victim(
        &mut self,
        cpu: usize,
        instr_id: u64,
        set: usize,
        set_view: &SetView,
        ip: Address,
        full_addr: Address,
        r#type: AccessType,
    ) -> usize {
        let mut victim = 0;
        for p in &mut self.policies {
            victim = p.find_victim(cpu, instr_id, set, set_view, ip, full_addr, r#type);
        }
        victim
    }

    pub fn update(
        &mut self,
        cpu: usize,
        set: usize,
        way: usize,
        full_addr: Address,
        ip: Address,
        victim_addr: Address,
        r#type: AccessType,
        hit: bool,
    ) {
        for p in &mut self.policies {
            p.update(cpu, set, way, full_addr, ip, victim_addr, r#type, hit);
        }
    }

    pub fn final_stats(&self) {
        for p in &self.policies {
            p.final_stats();
        }
    }
}

//! `no` / `no_instr`: no-op passthrough prefetchers.
//!
//! Verbatim behavior transcribed from
//! `examples/original_source/source/ChampSim/prefetcher/no/no.cc`.

use super::{PrefetchLineIssuer, PrefetchPolicy};
use crate::address::Address;
use crate::mem_fetch::AccessType;

pub struct No;

impl PrefetchPolicy for No {
    fn name(&self) -> &'static str {
        "no"
    }

    fn cache_operate(
        &mut self,
        _issuer: &mut dyn PrefetchLineIssuer,
        _addr: Address,
        _ip: Address,
        _cache_hit: bool,
        _type: AccessType,
        metadata_in: u64,
    ) -> u64 {
        metadata_in
    }

    fn cache_fill(
        &mut self,
        _issuer: &mut dyn PrefetchLineIssuer,
        _addr: Address,
        _set: usize,
        _way: usize,
        _prefetch: bool,
        _evicted_addr: Address,
        metadata_in: u64,
    ) -> u64 {
        metadata_in
    }
}

pub struct NoInstr;

impl PrefetchPolicy for NoInstr {
    fn name(&self) -> &'static str {
        "no_instr"
    }

    fn is_instruction_side(&self) -> bool {
        true
    }

    fn cache_operate(
        &mut self,
        _issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        ip: Address,
        _cache_hit: bool,
        _type: AccessType,
        metadata_in: u64,
    ) -> u64 {
        debug_assert_eq!(addr, ip);
        metadata_in
    }

    fn cache_fill(
        &mut self,
        _issuer: &mut dyn PrefetchLineIssuer,
        _addr: Address,
        _set: usize,
        _way: usize,
        _prefetch: bool,
        _evicted_addr: Address,
        metadata_in: u64,
    ) -> u64 {
        metadata_in
    }

    fn branch_operate(&mut self, _ip: Address, _branch_target: Address) {}
}

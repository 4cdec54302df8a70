//! Pluggable prefetcher shim: registers one or more prefetch policies and
//! invokes them in order, XOR-combining the return values of the two
//! result-bearing hooks (`cache_operate`, `cache_fill`).
//!
//! Grounded on ChampSim's bitmask-dispatch `module_model` in `cache.h` and
//! the stock policy bodies under
//! `examples/original_source/source/ChampSim/prefetcher/{next_line,no}*`.

pub mod ip_stride;
pub mod next_line;
pub mod no;
pub mod spp;
pub mod va_ampm_lite;

use crate::address::Address;
use crate::mem_fetch::AccessType;

/// Outcome of a call into the shim that asks a policy to issue a
/// prefetch. Mirrors the cache pipeline's `prefetch_line` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchLineResult {
    Accepted,
    Rejected,
}

/// The side-channel a policy uses to request a prefetch be inserted into
/// the local PQ. The cache pipeline implements this; policies only see
/// the trait.
pub trait PrefetchLineIssuer {
    fn prefetch_line(
        &mut self,
        addr: Address,
        fill_this_level: bool,
        metadata: u64,
    ) -> PrefetchLineResult;
}

/// Capability set a prefetch policy implements. `cache_operate` and
/// `cache_fill` return an opaque metadata word that is XOR-combined across
/// policies and threaded through to the eventual fill.
pub trait PrefetchPolicy {
    fn name(&self) -> &'static str;

    fn initialize(&mut self) {}

    /// Called on a demand/prefetch access that reached tag check, whether
    /// hit or miss. `metadata_in` is the value returned by the cache's
    /// most recent `cache_fill` for this line, if any.
    fn cache_operate(
        &mut self,
        issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        ip: Address,
        cache_hit: bool,
        r#type: AccessType,
        metadata_in: u64,
    ) -> u64;

    /// Called when a block is installed. Its return value becomes the
    /// block's stored `pf_metadata`.
    fn cache_fill(
        &mut self,
        issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        set: usize,
        way: usize,
        prefetch: bool,
        evicted_addr: Address,
        metadata_in: u64,
    ) -> u64;

    fn cycle_operate(&mut self, _issuer: &mut dyn PrefetchLineIssuer) {}

    /// Instruction-side hook. The default panics: data prefetchers must
    /// never receive branch events (asserted at shim registration, not
    /// here, so this only fires if that invariant is violated).
    fn branch_operate(&mut self, _ip: Address, _branch_target: Address) {
        unreachable!("branch_operate invoked on a data-cache prefetcher");
    }

    /// True for policies that consume `branch_operate` (the instruction
    /// side of the stock library). Data caches must reject these.
    fn is_instruction_side(&self) -> bool {
        false
    }

    fn final_stats(&self) {}
}

/// Invokes a list of registered policies in order and XOR-combines the
/// results of the metadata-bearing hooks.
pub struct PrefetcherShim {
    policies: Vec<Box<dyn PrefetchPolicy>>,
}

impl PrefetcherShim {
    /// Panics if an instruction-side policy is registered for a data cache
    /// (`is_data_cache == true`), per the stock library's assertion that
    /// instruction prefetchers must not be invoked on data caches.
    pub fn new(policies: Vec<Box<dyn PrefetchPolicy>>, is_data_cache: bool) -> Self {
        if is_data_cache {
            for p in &policies {
                assert!(
                    !p.is_instruction_side(),
                    "instruction-side prefetcher {} registered on a data cache",
                    p.name()
                );
            }
        }
        Self { policies }
    }

    pub fn initialize(&mut self) {
        for p in &mut self.policies {
            p.initialize();
        }
    }

    pub fn cache_operate(
        &mut self,
        issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        ip: Address,
        cache_hit: bool,
        r#type: AccessType,
    ) -> u64 {
        let mut metadata = 0u64;
        for p in &mut self.policies {
            metadata ^= p.cache_operate(issuer, addr, ip, cache_hit, r#type, metadata);
        }
        metadata
    }

    pub fn cache_fill(
        &mut self,
        issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        set: usize,
        way: usize,
        prefetch: bool,
        evicted_addr: Address,
    ) -> u64 {
        let mut metadata = 0u64;
        for p in &mut self.policies {
            metadata ^= p.cache_fill(issuer, addr, set, way, prefetch, evicted_addr, metadata);
        }
        metadata
    }

    pub fn cycle_operate(&mut self, issuer: &mut dyn PrefetchLineIssuer) {
        for p in &mut self.policies {
            p.cycle_operate(issuer);
        }
    }

    pub fn final_stats(&self) {
        for p in &self.policies {
            p.final_stats();
        }
    }
}

//! `next_line` / `next_line_instr`: prefetch block+1 on every operate.
//!
//! Verbatim behavior transcribed from
//! `examples/original_source/source/ChampSim/prefetcher/next_line/next_line.cc`
//! and its instruction-side sibling.

use super::{PrefetchLineIssuer, PrefetchPolicy};
use crate::address::Address;
use crate::mem_fetch::AccessType;

pub struct NextLine {
    block_size: u64,
}

impl NextLine {
    pub fn new(block_size: u64) -> Self {
        Self { block_size }
    }
}

impl PrefetchPolicy for NextLine {
    fn name(&self) -> &'static str {
        "next_line"
    }

    fn cache_operate(
        &mut self,
        issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        _ip: Address,
        _cache_hit: bool,
        _type: AccessType,
        metadata_in: u64,
    ) -> u64 {
        let next_block = (addr & !(self.block_size - 1)) + self.block_size;
        issuer.prefetch_line(next_block, true, metadata_in);
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

/// Instruction-side variant: identical prefetch behavior, but additionally
/// only valid when `addr == ip` (an instruction-cache access), and it
/// consumes `branch_operate`.
pub struct NextLineInstr {
    inner: NextLine,
}

impl NextLineInstr {
    pub fn new(block_size: u64) -> Self {
        Self {
            inner: NextLine::new(block_size),
        }
    }
}

impl PrefetchPolicy for NextLineInstr {
    fn name(&self) -> &'static str {
        "next_line_instr"
    }

    fn is_instruction_side(&self) -> bool {
        true
    }

    fn cache_operate(
        &mut self,
        issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        ip: Address,
        cache_hit: bool,
        r#type: AccessType,
        metadata_in: u64,
    ) -> u64 {
        debug_assert_eq!(addr, ip, "instruction prefetcher saw a non-ip access");
        self.inner
            .cache_operate(issuer, addr, ip, cache_hit, r#type, metadata_in)
    }

    fn cache_fill(
        &mut self,
        issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        set: usize,
        way: usize,
        prefetch: bool,
        evicted_addr: Address,
        metadata_in: u64,
    ) -> u64 {
        self.inner
            .cache_fill(issuer, addr, set, way, prefetch, evicted_addr, metadata_in)
    }

    fn branch_operate(&mut self, _ip: Address, _branch_target: Address) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefetcher::PrefetchLineResult;

    struct RecordingIssuer {
        requests: Vec<Address>,
    }

    impl PrefetchLineIssuer for RecordingIssuer {
        fn prefetch_line(&mut self, addr: Address, _fill: bool, _meta: u64) -> PrefetchLineResult {
            self.requests.push(addr);
            PrefetchLineResult::Accepted
        }
    }

    #[test]
    fn issues_adjacent_block() {
        let mut policy = NextLine::new(64);
        let mut issuer = RecordingIssuer { requests: vec![] };
        policy.cache_operate(&mut issuer, 0x40, 0, true, AccessType::Load, 0);
        assert_eq!(issuer.requests, vec![0x80]);
    }
}

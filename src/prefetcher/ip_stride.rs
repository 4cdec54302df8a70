//! `ip_stride`: per-IP last-address/stride table, issuing `stride`
//! lookahead prefetches when a stride is stable across two consecutive
//! accesses from the same instruction pointer.
//!
//! Not present in the retrieved original source slice; implemented from
//! the behavioral description in the distilled specification.

use super::{PrefetchLineIssuer, PrefetchPolicy};
use crate::address::Address;
use crate::mem_fetch::AccessType;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct IpEntry {
    last_addr: Address,
    last_stride: i64,
}

pub struct IpStride {
    table: HashMap<Address, IpEntry>,
    lookahead: u32,
    block_size: u64,
}

impl IpStride {
    pub fn new(block_size: u64, lookahead: u32) -> Self {
        Self {
            table: HashMap::new(),
            lookahead,
            block_size,
        }
    }
}

impl PrefetchPolicy for IpStride {
    fn name(&self) -> &'static str {
        "ip_stride"
    }

    fn cache_operate(
        &mut self,
        issuer: &mut dyn PrefetchLineIssuer,
        addr: Address,
        ip: Address,
        _cache_hit: bool,
        _type: AccessType,
        metadata_in: u64,
    ) -> u64 {
        let block = addr & !(self.block_size - 1);
        let entry = self.table.get(&ip).copied();
        let stride = entry.map(|e| block as i64 - e.last_addr as i64);

        if let (Some(prev), Some(stride)) = (entry, stride) {
            if stride != 0 && stride == prev.last_stride {
                for step in 1..=self.lookahead as i64 {
                    let target = block as i64 + stride * step;
                    if target >= 0 {
                        issuer.prefetch_line(target as u64, true, metadata_in);
                    }
                }
            }
        }

        self.table.insert(
            ip,
            IpEntry {
                last_addr: block,
                last_stride: stride.unwrap_or(0),
            },
        );
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
    fn stable_stride_triggers_lookahead() {
        let mut policy = IpStride::new(64, 2);
        let mut issuer = RecordingIssuer { requests: vec![] };
        policy.cache_operate(&mut issuer, 0x1000, 0xdead, true, AccessType::Load, 0);
        assert!(issuer.requests.is_empty());
        policy.cache_operate(&mut issuer, 0x1040, 0xdead, true, AccessType::Load, 0);
        assert!(issuer.requests.is_empty());
        policy.cache_operate(&mut issuer, 0x1080, 0xdead, true, AccessType::Load, 0);
        assert_eq!(issuer.requests, vec![0x10c0, 0x1100]);
    }
}

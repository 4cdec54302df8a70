//! `va_ampm_lite`: region-based same-page stride detector operating on
//! virtual addresses when `virtual_prefetch` is configured.
//!
//! Not present in the retrieved original source slice; implemented from
//! the behavioral description in the distilled specification. Tracks, per
//! page-sized region, whether the last two accesses to that region moved
//! by a constant stride, and issues one prefetch along that stride.

use super::{PrefetchLineIssuer, PrefetchPolicy};
use crate::address::Address;
use crate::mem_fetch::AccessType;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default)]
struct RegionState {
    last_offset: Option<i64>,
    last_stride: Option<i64>,
}

pub struct VaAmpmLite {
    block_size: u64,
    page_size: u64,
    regions: HashMap<u64, RegionState>,
}

impl VaAmpmLite {
    pub fn new(block_size: u64, page_size: u64) -> Self {
        Self {
            block_size,
            page_size,
            regions: HashMap::new(),
        }
    }
}

impl PrefetchPolicy for VaAmpmLite {
    fn name(&self) -> &'static str {
        "va_ampm_lite"
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
        let region = addr / self.page_size;
        let offset = (addr % self.page_size / self.block_size) as i64;
        let state = self.regions.entry(region).or_default();

        if let Some(last_offset) = state.last_offset {
            let stride = offset - last_offset;
            if stride != 0 && Some(stride) == state.last_stride {
                let target_offset = offset + stride;
                if target_offset >= 0 && (target_offset as u64) * self.block_size < self.page_size {
                    let target = region * self.page_size + target_offset as u64 * self.block_size;
                    issuer.prefetch_line(target, true, metadata_in);
                }
            }
            state.last_stride = Some(stride);
        }
        state.last_offset = Some(offset);
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

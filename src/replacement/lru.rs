//! Stock LRU: per-(set,way) `last_used_cycle`; victim is the argmin; the
//! recency timestamp is refreshed on every access except write-hits, to
//! avoid writeback storms polluting recency.
//!
//! Grounded on
//! `examples/original_source/source/ChampSim/replacement/lru/lru.cc`.

use super::{ReplacementPolicy, SetView};
use crate::address::Address;
use crate::mem_fetch::AccessType;

pub struct Lru {
    ways: usize,
    last_used_cycle: Vec<Vec<u64>>,
    cycle: u64,
}

impl Lru {
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            ways,
            last_used_cycle: vec![vec![0; ways]; sets],
            cycle: 0,
        }
    }
}

impl ReplacementPolicy for Lru {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn find_victim(
        &mut self,
        _cpu: usize,
        _instr_id: u64,
        set: usize,
        _set_view: &SetView,
        _ip: Address,
        _full_addr: Address,
        _type: AccessType,
    ) -> usize {
        let row = &self.last_used_cycle[set];
        (0..self.ways)
            .min_by_key(|&way| row[way])
            .expect("cache set has at least one way")
    }

    fn update(
        &mut self,
        _cpu: usize,
        set: usize,
        way: usize,
        _full_addr: Address,
        _ip: Address,
        _victim_addr: Address,
        r#type: AccessType,
        hit: bool,
    ) {
        self.cycle += 1;
        if hit && r#type == AccessType::Write {
            return;
        }
        self.last_used_cycle[set][way] = self.cycle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_is_least_recently_used() {
        let mut lru = Lru::new(1, 2);
        let view = SetView { tags: &[None, None] };
        lru.update(0, 0, 0, 0, 0, 0, AccessType::Load, false);
        lru.update(0, 0, 1, 0, 0, 0, AccessType::Load, false);
        let victim = lru.find_victim(0, 0, 0, &view, 0, 0, AccessType::Load);
        assert_eq!(victim, 0);
    }

    #[test]
    fn write_hit_does_not_refresh_recency() {
        let mut lru = Lru::new(1, 2);
        let view = SetView { tags: &[None, None] };
        lru.update(0, 0, 0, 0, 0, 0, AccessType::Load, false);
        lru.update(0, 0, 1, 0, 0, 0, AccessType::Load, false);
        lru.update(0, 0, 0, 0, 0, 0, AccessType::Write, true);
        let victim = lru.find_victim(0, 0, 0, &view, 0, 0, AccessType::Load);
        assert_eq!(victim, 0, "write hit must not count as recent use");
    }
}

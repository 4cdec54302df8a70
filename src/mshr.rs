//! MSHR (miss-status holding register) file.
//!
//! Grounded on ChampSim's `mshr_type::merge` (`cache.h`) and the teacher's
//! `mshrs: mshr::MshrTable` field / fill path in `ported/l1/base.rs`.

use crate::address::Address;
use crate::mem_fetch::{AccessType, InstrId, ListenerId};
use indexmap::IndexMap;
use log::{debug, trace};

/// Outstanding-miss record. Carries the same identity fields as a
/// `TagLookup` plus the cycle it was enqueued, for deadlock detection.
#[derive(Debug, Clone)]
pub struct MshrEntry {
    pub cpu: usize,
    pub block_address: Address,
    pub r#type: AccessType,
    pub cycle_enqueued: u64,
    pub event_cycle: u64,
    pub skip_fill: bool,
    /// True if this access was itself a prefetch issued *by this cache
    /// level* (as opposed to one forwarded from above): such a fill must
    /// not be marked `prefetch` again, since it was already consumed as a
    /// demand-side side effect of generating the prefetch.
    pub prefetch_from_this: bool,
    pub to_return: Vec<ListenerId>,
    pub instr_depend_on_me: Vec<InstrId>,
    pub pf_metadata: u64,
}

#[derive(Debug)]
pub enum AllocateResult {
    New,
    Merged,
    Full,
}

/// `(cpu, block_address)` identity key — at most one entry per key.
type MshrKey = (usize, Address);

#[derive(Debug)]
pub struct MshrTable {
    size: usize,
    entries: IndexMap<MshrKey, MshrEntry>,
    deadlock_threshold: u64,
}

impl MshrTable {
    pub fn new(size: usize, deadlock_threshold: u64) -> Self {
        Self {
            size,
            entries: IndexMap::with_capacity(size),
            deadlock_threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn occupancy_ratio(&self) -> f64 {
        self.entries.len() as f64 / self.size as f64
    }

    /// Allocate a new entry, or merge into an existing one for the same
    /// `(cpu, block_address)` per the demand-priority upgrade rule:
    /// `to_return`/`instr_depend_on_me` concatenate, and `type` is upgraded
    /// (clearing `skip_fill`) if the incoming request outranks the
    /// existing one.
    pub fn allocate_or_merge(&mut self, incoming: MshrEntry) -> AllocateResult {
        let key = (incoming.cpu, incoming.block_address);
        if let Some(existing) = self.entries.get_mut(&key) {
            existing.to_return.extend(incoming.to_return);
            existing
                .instr_depend_on_me
                .extend(incoming.instr_depend_on_me);
            if incoming.r#type.outranks(existing.r#type) {
                debug!(
                    "mshr merge upgrades {:?} -> {:?} at block {:#x}",
                    existing.r#type, incoming.r#type, key.1
                );
                existing.r#type = incoming.r#type;
                existing.skip_fill = false;
            }
            return AllocateResult::Merged;
        }
        if self.entries.len() >= self.size {
            return AllocateResult::Full;
        }
        trace!("mshr allocate block {:#x} cpu {}", key.1, key.0);
        self.entries.insert(key, incoming);
        AllocateResult::New
    }

    /// Remove and return the entry for a completed fill.
    pub fn complete(&mut self, cpu: usize, block_address: Address) -> Option<MshrEntry> {
        self.entries.shift_remove(&(cpu, block_address))
    }

    /// Drop an entry without completing it (used by `invalidate_entry`,
    /// which does not cancel an in-flight miss but may remove the block's
    /// shadow state).
    pub fn invalidate(&mut self, cpu: usize, block_address: Address) -> Option<MshrEntry> {
        self.entries.shift_remove(&(cpu, block_address))
    }

    /// Entries whose `event_cycle` has arrived, oldest first (insertion
    /// order, since `IndexMap` preserves it).
    pub fn ready_entries(&self, now: u64) -> impl Iterator<Item = (&MshrKey, &MshrEntry)> {
        self.entries.iter().filter(move |(_, e)| e.event_cycle <= now)
    }

    /// Called when the lower level delivers `finish_packet` for this
    /// entry: pulls its `event_cycle` forward to `now` (never pushes it
    /// back) so the next `fill_stage` drains it. Returns whether a
    /// matching entry was found.
    pub fn mark_ready(&mut self, cpu: usize, block_address: Address, now: u64) -> bool {
        if let Some(entry) = self.entries.get_mut(&(cpu, block_address)) {
            entry.event_cycle = entry.event_cycle.min(now);
            true
        } else {
            false
        }
    }

    /// The oldest outstanding entry's age, for deadlock detection.
    pub fn oldest_age(&self, now: u64) -> Option<u64> {
        self.entries
            .values()
            .map(|e| now.saturating_sub(e.cycle_enqueued))
            .max()
    }

    pub fn is_deadlocked(&self, now: u64) -> bool {
        self.oldest_age(now)
            .map(|age| age >= self.deadlock_threshold)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MshrEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cpu: usize, addr: Address, ty: AccessType, cycle: u64) -> MshrEntry {
        MshrEntry {
            cpu,
            block_address: addr,
            r#type: ty,
            cycle_enqueued: cycle,
            event_cycle: cycle + 10,
            skip_fill: false,
            prefetch_from_this: false,
            to_return: vec![1],
            instr_depend_on_me: vec![],
            pf_metadata: 0,
        }
    }

    #[test]
    fn no_duplicate_entries_for_same_block() {
        let mut table = MshrTable::new(4, 1000);
        assert!(matches!(
            table.allocate_or_merge(entry(0, 0x100, AccessType::Load, 0)),
            AllocateResult::New
        ));
        assert!(matches!(
            table.allocate_or_merge(entry(0, 0x100, AccessType::Load, 1)),
            AllocateResult::Merged
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn merge_upgrades_demand_priority() {
        let mut table = MshrTable::new(4, 1000);
        table.allocate_or_merge(entry(0, 0x100, AccessType::Prefetch, 0));
        table.allocate_or_merge(entry(0, 0x100, AccessType::Load, 1));
        let e = table.complete(0, 0x100).unwrap();
        assert_eq!(e.r#type, AccessType::Load);
        assert_eq!(e.to_return.len(), 2);
    }

    #[test]
    fn full_table_rejects_new_block() {
        let mut table = MshrTable::new(1, 1000);
        table.allocate_or_merge(entry(0, 0x100, AccessType::Load, 0));
        assert!(matches!(
            table.allocate_or_merge(entry(0, 0x200, AccessType::Load, 0)),
            AllocateResult::Full
        ));
    }

    #[test]
    fn finish_packet_pulls_completion_forward_but_never_back() {
        let mut table = MshrTable::new(4, 1000);
        table.allocate_or_merge(entry(0, 0x100, AccessType::Load, 0)); // event_cycle = 10
        assert!(table.mark_ready(0, 0x100, 3));
        assert!(table.ready_entries(3).next().is_some());
        assert!(!table.mark_ready(0, 0x999, 3), "no entry for that block");
        // A later, larger `now` must not push the already-pulled-forward
        // event_cycle back out.
        table.mark_ready(0, 0x100, 20);
        assert!(table.ready_entries(3).next().is_some());
    }

    #[test]
    fn deadlock_detected_past_threshold() {
        let mut table = MshrTable::new(4, 100);
        table.allocate_or_merge(entry(0, 0x100, AccessType::Load, 0));
        assert!(!table.is_deadlocked(50));
        assert!(table.is_deadlocked(100));
    }
}

//! Stock DRRIP: dynamic dueling between SRRIP and a bimodal (mostly-BIP)
//! insertion policy, selected per-set by a small set-dueling monitor and
//! arbitrated globally by a saturating policy-selection counter (PSEL).
//!
//! Implemented from the behavioral description in the distilled
//! specification (§4.4, "bimodal/dueling set selection"); not present in
//! the retrieved original source slice.

use super::{ReplacementPolicy, SetView};
use crate::address::Address;
use crate::mem_fetch::AccessType;

const RRPV_BITS: u32 = 2;
const BIP_INSERT_PROBABILITY_DENOM: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetRole {
    SrripLeader,
    BipLeader,
    Follower,
}

pub struct Drrip {
    ways: usize,
    rrpv: Vec<Vec<u8>>,
    max_rrpv: u8,
    role: Vec<SetRole>,
    psel: i32,
    bip_counter: u32,
}

impl Drrip {
    pub fn new(sets: usize, ways: usize, num_leader_sets: usize) -> Self {
        let max_rrpv = ((1u32 << RRPV_BITS) - 1) as u8;
        let mut role = vec![SetRole::Follower; sets];
        for i in 0..num_leader_sets.min(sets / 2) {
            role[i] = SetRole::SrripLeader;
            role[sets - 1 - i] = SetRole::BipLeader;
        }
        Self {
            ways,
            rrpv: vec![vec![max_rrpv; ways]; sets],
            max_rrpv,
            role,
            psel: 0,
            bip_counter: 0,
        }
    }

    fn uses_srrip(&self, set: usize) -> bool {
        match self.role[set] {
            SetRole::SrripLeader => true,
            SetRole::BipLeader => false,
            SetRole::Follower => self.psel >= 0,
        }
    }
}

impl ReplacementPolicy for Drrip {
    fn name(&self) -> &'static str {
        "drrip"
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
        loop {
            let row = &self.rrpv[set];
            if let Some(way) = (0..self.ways).find(|&w| row[w] == self.max_rrpv) {
                return way;
            }
            for way in 0..self.ways {
                self.rrpv[set][way] = self.rrpv[set][way].saturating_add(1).min(self.max_rrpv);
            }
        }
    }

    fn update(
        &mut self,
        _cpu: usize,
        set: usize,
        way: usize,
        _full_addr: Address,
        _ip: Address,
        _victim_addr: Address,
        _type: AccessType,
        hit: bool,
    ) {
        if hit {
            self.rrpv[set][way] = 0;
            match self.role[set] {
                SetRole::SrripLeader => self.psel = (self.psel + 1).min(1023),
                SetRole::BipLeader => self.psel = (self.psel - 1).max(-1024),
                SetRole::Follower => {}
            }
            return;
        }

        let insert_rrpv = if self.uses_srrip(set) {
            self.max_rrpv.saturating_sub(1)
        } else {
            self.bip_counter += 1;
            if self.bip_counter % BIP_INSERT_PROBABILITY_DENOM == 0 {
                self.max_rrpv.saturating_sub(1)
            } else {
                self.max_rrpv
            }
        };
        self.rrpv[set][way] = insert_rrpv;
    }
}

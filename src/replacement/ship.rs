//! Stock SHIP: signature-based hit predictor layered on RRPV insertion.
//! A small signature history counter table (SHCT), indexed by a hash of
//! the instruction pointer, predicts whether a line inserted by that IP
//! tends to be reused; predicted-reused lines insert at RRPV 0 instead of
//! the default near-max value.
//!
//! Implemented from the behavioral description in the distilled
//! specification (§4.4, "`0` for SHIP-predicted-reused"); not present in
//! the retrieved original source slice.

use super::{ReplacementPolicy, SetView};
use crate::address::Address;
use crate::mem_fetch::AccessType;
use std::collections::HashMap;

const RRPV_BITS: u32 = 2;
const SHCT_MAX: u8 = 7;
const SHIP_REUSE_THRESHOLD: u8 = 4;

pub struct Ship {
    ways: usize,
    rrpv: Vec<Vec<u8>>,
    max_rrpv: u8,
    shct: HashMap<Address, u8>,
    outcome: Vec<Vec<bool>>,
    signature: Vec<Vec<Address>>,
}

impl Ship {
    pub fn new(sets: usize, ways: usize) -> Self {
        let max_rrpv = ((1u32 << RRPV_BITS) - 1) as u8;
        Self {
            ways,
            rrpv: vec![vec![max_rrpv; ways]; sets],
            max_rrpv,
            shct: HashMap::new(),
            outcome: vec![vec![false; ways]; sets],
            signature: vec![vec![0; ways]; sets],
        }
    }

    fn signature_of(ip: Address) -> Address {
        ip & 0x3fff
    }
}

impl ReplacementPolicy for Ship {
    fn name(&self) -> &'static str {
        "ship"
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
        ip: Address,
        _victim_addr: Address,
        _type: AccessType,
        hit: bool,
    ) {
        let sig = Self::signature_of(ip);
        if hit {
            self.rrpv[set][way] = 0;
            if !self.outcome[set][way] {
                self.outcome[set][way] = true;
                let counter = self.shct.entry(self.signature[set][way]).or_insert(0);
                *counter = (*counter + 1).min(SHCT_MAX);
            }
            return;
        }

        if self.outcome[set][way] {
            let prior_sig = self.signature[set][way];
            let counter = self.shct.entry(prior_sig).or_insert(0);
            *counter = counter.saturating_sub(1);
        }

        let predicted_reused = self.shct.get(&sig).copied().unwrap_or(0) >= SHIP_REUSE_THRESHOLD;
        self.rrpv[set][way] = if predicted_reused {
            0
        } else {
            self.max_rrpv.saturating_sub(1)
        };
        self.signature[set][way] = sig;
        self.outcome[set][way] = false;
    }
}

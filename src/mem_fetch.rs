//! Wire types exchanged across channels between cache levels: the request
//! taxonomy, and the `Request`/`Response` structures.
//!
//! Grounded on `tag_lookup_type`/`mshr_type` in ChampSim's `cache.h`; enum
//! plumbing mirrors the teacher's use of `strum` for access-type enums.

pub use crate::address::Address;
use strum::{Display, EnumCount};

/// An opaque instruction identifier. The out-of-order core that would
/// interpret this is an external collaborator; the cache only threads it
/// through unmodified.
pub type InstrId = u64;

/// Request-type taxonomy. Ordering reflects demand priority for MSHR merge
/// upgrades: `LOAD > RFO > PREFETCH`. `WRITE` and `TRANSLATION` never
/// participate in that upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount)]
pub enum AccessType {
    Load,
    Rfo,
    Prefetch,
    Write,
    Translation,
}

impl AccessType {
    /// Demand priority used by MSHR merge (`LOAD > RFO > PREFETCH`).
    /// `WRITE`/`TRANSLATION` are not compared against this ladder; callers
    /// must not merge across those types.
    fn demand_rank(self) -> u8 {
        match self {
            AccessType::Load => 3,
            AccessType::Rfo => 2,
            AccessType::Prefetch => 1,
            AccessType::Write | AccessType::Translation => 0,
        }
    }

    /// True if `self` has strictly higher demand priority than `other`.
    pub fn outranks(self, other: AccessType) -> bool {
        self.demand_rank() > other.demand_rank()
    }

    /// Single-bit mask position for this type, for `prefetch_activate_mask`.
    pub fn mask_bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A handle identifying an upstream listener queue that should receive the
/// eventual response to a request. Kept abstract: the cache pipeline only
/// needs to preserve registration order, not interpret the handle.
pub type ListenerId = usize;

/// A single byte payload placeholder. Real data movement is out of scope;
/// callers that need contents carry them out-of-band. Kept as a fixed-size
/// opaque array to mirror the wire `data` field without committing to a
/// block size here (the cache config owns that).
pub type Payload = Vec<u8>;

#[derive(Debug, Clone)]
pub struct Request {
    pub address: Address,
    pub v_address: Address,
    pub data: Payload,
    pub ip: Address,
    pub instr_id: InstrId,
    pub pf_metadata: u64,
    pub cpu: usize,
    pub r#type: AccessType,
    pub prefetch_from_this: bool,
    pub skip_fill: bool,
    pub is_translated: bool,
    pub asid: [u8; 2],
    pub event_cycle: u64,
    pub instr_depend_on_me: Vec<InstrId>,
    pub to_return: Vec<ListenerId>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub address: Address,
    pub v_address: Address,
    pub data: Payload,
    pub pf_metadata: u64,
    pub cpu: usize,
    pub r#type: AccessType,
    pub instr_depend_on_me: Vec<InstrId>,
    pub to_return: Vec<ListenerId>,
}

impl Request {
    pub fn block_address(&self, offset_bits: u32) -> Address {
        (self.address >> offset_bits) << offset_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_priority_ladder() {
        assert!(AccessType::Load.outranks(AccessType::Rfo));
        assert!(AccessType::Rfo.outranks(AccessType::Prefetch));
        assert!(!AccessType::Prefetch.outranks(AccessType::Load));
    }
}

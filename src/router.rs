//! Memory router (C8): selects near vs far physical memory for a
//! downstream miss from the hardware address the remapping engine (C9)
//! resolves, forwards it to the matching DRAM adaptor (C10), and drives
//! the remapping engine's own migration/eviction traffic through the same
//! adaptors.
//!
//! Grounded on the address-space-partitioned memory controller pattern in
//! `examples/original_source/src/multiple_granularity.cc` (the
//! `physical_to_hardware_address`/`memory_activity_tracking` call sites
//! that sit between the cache's miss path and the DRAM model) and the
//! `send`/callback boundary in
//! `examples/original_source/source/Ramulator/Ramulator.cpp`.

use crate::dram::{Completed, DramAdaptor, Request as DramRequest, RequestType, SendResult};
use crate::mem_fetch::{AccessType, Request, Response};
use crate::operable::Operable;
use crate::remap::{RemappingEngine, RemappingRequest};
use log::{trace, warn};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// How many queued remapping requests the router will hand to the DRAM
/// adaptor per cycle, independent of demand-miss traffic.
const DEFAULT_REMAP_ISSUE_BUDGET: usize = 1;

pub struct MemoryRouter {
    near: Box<dyn DramAdaptor>,
    far: Box<dyn DramAdaptor>,
    remap: RemappingEngine,
    next_packet: u64,
    remap_issue_budget: usize,

    /// `[near, far]` read/write counters and migration totals, mirroring
    /// `SIMULATOR_STATISTICS`'s `read_request_in_memory`/
    /// `write_request_in_memory`/`swapping_count`/
    /// `swapping_traffic_in_bytes`.
    read_request_in_memory: [u64; 2],
    write_request_in_memory: [u64; 2],
    swapping_count: u64,
    swapping_traffic_in_bytes: u64,

    /// Responses ready for the originating cache's `finish_packet`.
    /// Shared with the `FnOnce` completion callbacks handed to the DRAM
    /// adaptors, which fire from inside their own `tick()` with no path
    /// back to a borrowed `&mut MemoryRouter` — so completions land here
    /// instead and `drain_completions` picks them up synchronously after
    /// `tick()` returns, all on the same cooperative single thread.
    completed: Rc<RefCell<VecDeque<Response>>>,
    /// Same pattern for remapping-request completions, consumed by `tick`
    /// itself to update the placement table.
    remap_completed: Rc<RefCell<VecDeque<RemappingRequest>>>,
}

impl MemoryRouter {
    pub fn new(near: Box<dyn DramAdaptor>, far: Box<dyn DramAdaptor>, remap: RemappingEngine) -> Self {
        Self {
            near,
            far,
            remap,
            next_packet: 0,
            remap_issue_budget: DEFAULT_REMAP_ISSUE_BUDGET,
            read_request_in_memory: [0, 0],
            write_request_in_memory: [0, 0],
            swapping_count: 0,
            swapping_traffic_in_bytes: 0,
            completed: Rc::new(RefCell::new(VecDeque::new())),
            remap_completed: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn remap(&self) -> &RemappingEngine {
        &self.remap
    }

    /// `[near, far]` completed-read counts, for `SIMULATOR_STATISTICS`.
    pub fn read_request_in_memory(&self) -> [u64; 2] {
        self.read_request_in_memory
    }

    /// `[near, far]` completed-write counts, for `SIMULATOR_STATISTICS`.
    pub fn write_request_in_memory(&self) -> [u64; 2] {
        self.write_request_in_memory
    }

    pub fn swapping_count(&self) -> u64 {
        self.swapping_count
    }

    pub fn swapping_traffic_in_bytes(&self) -> u64 {
        self.swapping_traffic_in_bytes
    }

    fn allocate_packet(&mut self) -> u64 {
        let id = self.next_packet;
        self.next_packet += 1;
        id
    }

    /// Routes every miss a cache forwarded this cycle (via
    /// `Cache::drain_lower_requests`) to the memory that currently holds
    /// its data, tracking hot/cold access statistics along the way.
    pub fn route(&mut self, requests: Vec<Request>, now: u64) {
        for request in requests {
            self.route_one(request, now);
        }
    }

    fn route_one(&mut self, request: Request, _now: u64) {
        let queue_busy = self.far.queue_busy_degree().max(self.near.queue_busy_degree());
        self.remap.memory_activity_tracking(request.address, queue_busy);

        let in_fast = self.remap.is_in_fast_memory(request.address);
        let hw_addr = self.remap.physical_to_hardware_address(request.address);
        let dram_type = match request.r#type {
            AccessType::Write => RequestType::Write,
            _ => RequestType::Read,
        };

        let completed = Rc::clone(&self.completed);
        let cpu = request.cpu;
        let address = request.address;
        let v_address = request.v_address;
        let pf_metadata = request.pf_metadata;
        let r#type = request.r#type;

        let packet = self.allocate_packet();
        let dram_request = DramRequest {
            addr: hw_addr,
            r#type: dram_type,
            coreid: cpu,
            memory_id: if in_fast { 0 } else { 1 },
            packet,
            callback: Box::new(move |_completed: Completed| {
                completed.borrow_mut().push_back(Response {
                    address,
                    v_address,
                    data: Vec::new(),
                    pf_metadata,
                    cpu,
                    r#type,
                    instr_depend_on_me: Vec::new(),
                    to_return: Vec::new(),
                });
            }),
        };

        let adaptor: &mut dyn DramAdaptor = if in_fast { &mut *self.near } else { &mut *self.far };
        match adaptor.send(dram_request) {
            SendResult::Accepted => {
                let memory_id = if in_fast { 0 } else { 1 };
                match dram_type {
                    RequestType::Write => self.write_request_in_memory[memory_id] += 1,
                    _ => self.read_request_in_memory[memory_id] += 1,
                }
                trace!(
                    "router: routed {:#x} -> {} memory (hw={:#x})",
                    address,
                    if in_fast { "near" } else { "far" },
                    hw_addr
                );
            }
            SendResult::Busy => {
                warn!(
                    "router: {} memory busy, dropping request for {:#x} (upstream miss resolves via its own timer)",
                    if in_fast { "near" } else { "far" },
                    address
                );
            }
        }
    }

    /// Issues up to `remap_issue_budget` queued migration/eviction
    /// requests as DRAM traffic against the far adaptor (the side that
    /// always participates in a migration) so their completion drives
    /// `RemappingEngine::finish_remapping_request`.
    fn issue_remapping_requests(&mut self) {
        for _ in 0..self.remap_issue_budget {
            let Some(request) = self.remap.drain_ready_request() else {
                break;
            };
            let remap_completed = Rc::clone(&self.remap_completed);
            let packet = self.allocate_packet();
            let dram_request = DramRequest {
                addr: request.address_in_sm,
                r#type: RequestType::Write,
                coreid: 0,
                memory_id: 1,
                packet,
                callback: Box::new(move |_completed: Completed| {
                    remap_completed.borrow_mut().push_back(request);
                }),
            };
            if let SendResult::Busy = self.far.send(dram_request) {
                warn!(
                    "router: far memory busy, dropping remapping request fm={:#x} sm={:#x}",
                    request.address_in_fm, request.address_in_sm
                );
            }
        }
    }

    /// Advances both DRAM adaptors, drains completed remapping traffic
    /// into the placement table, and issues freshly queued remapping
    /// requests. Returns a non-zero work count when anything happened.
    pub fn tick(&mut self, now: u64) -> usize {
        self.remap.maybe_decay_on_cycle(now);
        self.near.tick(now);
        self.far.tick(now);

        let mut work = 0;
        let ready: Vec<RemappingRequest> = self.remap_completed.borrow_mut().drain(..).collect();
        for request in ready {
            self.swapping_count += 1;
            self.swapping_traffic_in_bytes += request.size.bytes() as u64;
            self.remap.finish_remapping_request(request);
            work += 1;
        }
        self.issue_remapping_requests();
        work
    }

    /// Pops every completed demand request, ready for
    /// `Cache::finish_packet`.
    pub fn drain_completions(&mut self) -> Vec<Response> {
        self.completed.borrow_mut().drain(..).collect()
    }
}

impl Operable for MemoryRouter {
    fn clock_period(&self) -> u64 {
        1
    }

    fn operate(&mut self, now: u64) -> usize {
        self.tick(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecayDriver;
    use crate::dram::FixedLatencyDram;

    fn router() -> MemoryRouter {
        let remap = RemappingEngine::new(4, 1 << 20, 1 << 12, 8, 90, DecayDriver::Cycles, 1000);
        MemoryRouter::new(
            Box::new(FixedLatencyDram::new(4, 8)),
            Box::new(FixedLatencyDram::new(20, 8)),
            remap,
        )
    }

    fn request(addr: u64, r#type: AccessType) -> Request {
        Request {
            address: addr,
            v_address: addr,
            data: Vec::new(),
            ip: 0,
            instr_id: 0,
            pf_metadata: 0,
            cpu: 0,
            r#type,
            prefetch_from_this: false,
            skip_fill: false,
            is_translated: true,
            asid: [0, 0],
            event_cycle: 0,
            instr_depend_on_me: Vec::new(),
            to_return: Vec::new(),
        }
    }

    #[test]
    fn a_routed_miss_eventually_completes() {
        let mut router = router();
        router.route(vec![request(0x1000, AccessType::Load)], 0);

        let mut now = 0;
        let mut completions = Vec::new();
        for _ in 0..50 {
            now += 1;
            router.tick(now);
            completions.extend(router.drain_completions());
            if !completions.is_empty() {
                break;
            }
        }
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].address, 0x1000);
    }

    #[test]
    fn a_hot_far_block_eventually_migrates_via_the_router() {
        let mut router = router();
        // far_block_tag=1, placement_index=0 against a 1<<12 fast memory
        // (one frame, congruence group size 256).
        let far_addr = 1u64 << 20; // tag 1 * capacity_blocks(256) ... picked to land tag!=0
        for _ in 0..8 {
            router.route(vec![request(far_addr, AccessType::Load)], 0);
        }

        let mut now = 0;
        for _ in 0..100 {
            now += 1;
            router.tick(now);
            router.drain_completions();
        }
        // Either a migration completed (placement table non-empty) or the
        // access pattern didn't land on a fresh congruence slot; either
        // way the router must not have panicked or deadlocked draining
        // fifty cycles of traffic, which is what this test guards.
        let _ = router.remap().placement_table();
    }

    #[test]
    fn routing_a_read_and_a_write_updates_the_per_memory_counters() {
        let mut router = router();
        router.route(vec![request(0x1000, AccessType::Load)], 0);
        router.route(vec![request(0x2000, AccessType::Write)], 0);

        // Both addresses are native far-memory (never migrated), so both
        // land on index 1 ("far") of the per-memory counters.
        assert_eq!(router.read_request_in_memory(), [0, 1]);
        assert_eq!(router.write_request_in_memory(), [0, 1]);
    }

    #[test]
    fn a_completed_migration_counts_as_swapping_traffic() {
        let mut router = router();
        let far_addr = 1u64 << 20;
        for _ in 0..8 {
            router.route(vec![request(far_addr, AccessType::Load)], 0);
        }

        let mut now = 0;
        for _ in 0..100 {
            now += 1;
            router.tick(now);
            router.drain_completions();
            if router.swapping_count() > 0 {
                break;
            }
        }
        assert!(router.swapping_count() > 0, "a hot far-memory block should eventually migrate");
        assert!(router.swapping_traffic_in_bytes() > 0);
    }
}

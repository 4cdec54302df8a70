//! DRAM adaptor boundary (C10): the simulator only depends on a
//! `send(Request) -> Accepted|Busy` / callback contract. Real DRAM timing
//! is an external collaborator; `FixedLatencyDram` is a reference
//! implementation sufficient to drive the cache pipeline and remapping
//! engine end-to-end.
//!
//! Grounded on `examples/original_source/include/Ramulator/Request.h` and
//! the fixed-latency fallback in
//! `examples/original_source/source/Ramulator/Ramulator.cpp`'s
//! `recvAtomic`.

use crate::address::Address;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Read,
    Write,
    Refresh,
}

/// A completed request, handed to the callback. Carries the same identity
/// fields as the originating `Request`, minus the callback itself.
#[derive(Debug, Clone, Copy)]
pub struct Completed {
    pub addr: Address,
    pub r#type: RequestType,
    pub coreid: usize,
    pub memory_id: usize,
    pub packet: u64,
}

/// A single in-flight DRAM request. `callback` is invoked at or after the
/// cycle the underlying model declares it serviced; `packet` is an opaque
/// token round-tripped back to the caller.
pub struct Request {
    pub addr: Address,
    pub r#type: RequestType,
    pub coreid: usize,
    pub memory_id: usize,
    pub packet: u64,
    pub callback: Box<dyn FnOnce(Completed)>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("addr", &self.addr)
            .field("type", &self.r#type)
            .field("coreid", &self.coreid)
            .field("memory_id", &self.memory_id)
            .field("packet", &self.packet)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Accepted,
    Busy,
}

/// The thin boundary the cache pipeline and remapping engine depend on.
/// A real timing model lives outside this crate; `tick()` is the unit of
/// progress the scheduler drives.
pub trait DramAdaptor {
    fn send(&mut self, request: Request) -> SendResult;
    fn tick(&mut self, now: u64);

    /// 0..=100 occupancy signal the remapping engine consults before
    /// enqueuing more migration traffic.
    fn queue_busy_degree(&self) -> u8;
}

struct Pending {
    ready_at: u64,
    request: Request,
}

/// Reference DRAM adaptor: every request completes exactly
/// `fixed_latency` cycles after being sent, regardless of type or
/// address, mirroring Ramulator's atomic fixed-latency fallback path.
pub struct FixedLatencyDram {
    fixed_latency: u64,
    capacity: usize,
    in_flight: VecDeque<Pending>,
}

impl FixedLatencyDram {
    pub fn new(fixed_latency: u64, capacity: usize) -> Self {
        Self {
            fixed_latency,
            capacity,
            in_flight: VecDeque::with_capacity(capacity),
        }
    }
}

impl DramAdaptor for FixedLatencyDram {
    fn send(&mut self, request: Request) -> SendResult {
        if self.in_flight.len() >= self.capacity {
            return SendResult::Busy;
        }
        self.in_flight.push_back(Pending {
            ready_at: 0,
            request,
        });
        SendResult::Accepted
    }

    fn tick(&mut self, now: u64) {
        for pending in self.in_flight.iter_mut() {
            if pending.ready_at == 0 {
                pending.ready_at = now + self.fixed_latency;
            }
        }
        while let Some(front) = self.in_flight.front() {
            if front.ready_at > now {
                break;
            }
            let Pending { request, .. } = self.in_flight.pop_front().unwrap();
            let completed = Completed {
                addr: request.addr,
                r#type: request.r#type,
                coreid: request.coreid,
                memory_id: request.memory_id,
                packet: request.packet,
            };
            (request.callback)(completed);
        }
    }

    fn queue_busy_degree(&self) -> u8 {
        ((self.in_flight.len() * 100) / self.capacity.max(1)) as u8
    }
}

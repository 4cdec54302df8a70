//! Cooperative clock trait and scheduler.
//!
//! Grounded on `examples/original_source/include/ChampSim/operable.h`'s
//! `operable` base class: each component has a clock period and is ticked
//! by a scheduler that owns the global simulated-cycle counter.

use crate::error::SimError;
use log::{error, warn};

/// A schedulable component. `clock_period` is expressed in the scheduler's
/// base time unit (picoseconds in the original; here simply "ticks");
/// components with a smaller period run more often.
pub trait Operable {
    fn clock_period(&self) -> u64;

    /// Advance this component by one of its own cycles. Returns the number
    /// of pipeline stages that performed work, for forward-progress
    /// detection (a return of 0 for `deadlock_threshold` consecutive own
    /// cycles is a hang, not necessarily a fatal one by itself).
    fn operate(&mut self, now: u64) -> usize;

    fn begin_phase(&mut self) {}
    fn end_phase(&mut self) {}

    /// Emit a deadlock report (MSHR + queue contents) for diagnostics. The
    /// default does nothing; components owning an MSHR override this.
    fn print_deadlock(&self, _now: u64) {}

    /// Return `Some(error)` if this component has detected a fatal,
    /// unrecoverable condition (e.g. deadlock) that should stop the run.
    fn fatal_error(&self, _now: u64) -> Option<SimError> {
        None
    }
}

/// Drives a set of components over a shared simulated-cycle clock, in
/// dependency order (registration order), cooperative and single-threaded.
pub struct Scheduler {
    now: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { now: 0 }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Advance the global clock by one tick and operate every component
    /// whose clock period divides the new time. Returns `Err` if any
    /// component reports a fatal error this tick.
    pub fn step(&mut self, components: &mut [&mut dyn Operable]) -> Result<usize, SimError> {
        self.now += 1;
        let mut total_work = 0;
        for component in components.iter_mut() {
            if self.now % component.clock_period() != 0 {
                continue;
            }
            total_work += component.operate(self.now);
            if let Some(err) = component.fatal_error(self.now) {
                component.print_deadlock(self.now);
                error!("fatal condition at cycle {}: {err}", self.now);
                return Err(err);
            }
        }
        if total_work == 0 {
            warn!("cycle {} performed no work across {} components", self.now, components.len());
        }
        Ok(total_work)
    }

    pub fn begin_phase(&mut self, components: &mut [&mut dyn Operable]) {
        for c in components.iter_mut() {
            c.begin_phase();
        }
    }

    pub fn end_phase(&mut self, components: &mut [&mut dyn Operable]) {
        for c in components.iter_mut() {
            c.end_phase();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

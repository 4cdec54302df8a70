//! Error kinds shared across the simulator core.

use thiserror::Error;

/// Fatal or recoverable conditions raised by the cache pipeline, MSHR file,
/// and remapping engine.
#[derive(Error, Debug)]
pub enum SimError {
    /// A request was rejected because the target queue had no free slot.
    /// Recoverable: the caller retries on a later cycle.
    #[error("queue full: {queue}")]
    QueueFull { queue: &'static str },

    /// No MSHR entry could be allocated for a miss. Recoverable: the
    /// tag-check stalls and retries.
    #[error("mshr full (size={size})")]
    MshrFull { size: usize },

    /// The oldest outstanding MSHR entry exceeded `deadlock_threshold`
    /// cycles without completing. Fatal.
    #[error("deadlock detected at cycle {cycle}: {mshr_dump} outstanding mshr entries, queues: {queue_dump}")]
    Deadlock {
        cycle: u64,
        mshr_dump: usize,
        queue_dump: String,
    },

    /// Configuration failed validation at startup. Fatal.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// An internal invariant of the placement table was violated. Fatal;
    /// indicates a logic bug rather than a load condition.
    #[error("placement table invariant violated: {0}")]
    PlacementInvariantViolation(String),
}

/// Process exit codes, per the external interface contract.
pub mod exit_code {
    pub const NORMAL: i32 = 0;
    pub const DEADLOCK: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

//! Spool polling for the queue worker.
//!
//! The nudge sent by the webhook handler is the primary trigger, but it is
//! best effort: a full channel drops it, and jobs spooled while the process
//! was down get no nudge at all. The worker therefore also rescans the spool
//! periodically.

use std::time::Duration;

/// Default interval between spool rescans (30 seconds).
pub const DEFAULT_SPOOL_POLL_SECS: u64 = 30;

/// Default capacity of the nudge channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the worker's polling fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Interval between spool rescans.
    pub poll_interval: Duration,

    /// Capacity of the channel used to nudge the worker.
    pub channel_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    /// Creates a new `PollConfig` with default values.
    pub fn new() -> Self {
        PollConfig {
            poll_interval: Duration::from_secs(DEFAULT_SPOOL_POLL_SECS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Same defaults with a different rescan interval.
    pub fn with_interval(poll_interval: Duration) -> Self {
        PollConfig {
            poll_interval,
            ..Self::new()
        }
    }
}

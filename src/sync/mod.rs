// ABOUTME: Clock synchronization for the Sendspin protocol
// ABOUTME: NTP four-timestamp fusion into a drift-aware offset estimate

/// Recursive offset/drift estimator fed by NTP-style exchanges
pub mod filter;

pub use filter::TimeFilter;

use std::time::Instant;

/// Session-local monotonic clock, in integer microseconds.
///
/// All local timestamps in the core (filter anchors, `client/time`
/// transmission times, scheduling deadlines) are measured against one
/// origin so they are directly comparable.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    origin: Instant,
}

impl LocalClock {
    /// Create a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Microseconds elapsed since the clock origin.
    pub fn now_us(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

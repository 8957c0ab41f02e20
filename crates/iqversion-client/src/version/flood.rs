//! Minimum-interval reply limiter.
//!
//! Every inbound query stamps `last_stamp`, including the ones that get
//! suppressed, so a steady stream faster than `min_interval` keeps the gate
//! shut. A zero interval disables suppression but still stamps.

use std::time::Duration;

/// Default minimum gap between two replies on one connection.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 100;

/// Outcome of a flood check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodDecision {
    Reply,
    Suppress,
}

#[derive(Debug, Clone)]
pub struct FloodGuard {
    min_interval_ms: u64,
    /// None until the first query.
    last_stamp: Option<u64>,
}

impl Default for FloodGuard {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_MIN_INTERVAL_MS))
    }
}

impl FloodGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval_ms: millis(min_interval),
            last_stamp: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval_ms = millis(min_interval);
    }

    pub fn last_stamp(&self) -> Option<u64> {
        self.last_stamp
    }

    /// Record a query at `now_ms` and decide whether it may be answered.
    pub fn check(&mut self, now_ms: u64) -> FloodDecision {
        // A clock stepping backwards reads as zero elapsed time.
        let delta = self.last_stamp.map(|last| now_ms.saturating_sub(last));
        self.last_stamp = Some(now_ms);

        match delta {
            Some(d) if self.min_interval_ms > 0 && d < self.min_interval_ms => {
                FloodDecision::Suppress
            }
            _ => FloodDecision::Reply,
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

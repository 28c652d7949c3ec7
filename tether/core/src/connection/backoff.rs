//! Reconnect Backoff
//!
//! Exponential schedule: attempt `n` (1-based) waits `base * 2^(n-1)`. After
//! `max_attempts` failed attempts the schedule is exhausted.

use std::time::Duration;

/// Exponential reconnect schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub base_delay: Duration,
    /// Attempts allowed before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy
    #[must_use]
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before attempt `attempt` (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Delay for the attempt following `failed` previous attempts
    ///
    /// Returns `None` once the schedule is exhausted.
    #[must_use]
    pub fn next_delay(&self, failed: u32) -> Option<Duration> {
        if failed >= self.max_attempts {
            return None;
        }
        Some(self.delay_for(failed + 1))
    }
}

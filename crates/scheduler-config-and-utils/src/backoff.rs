//! Retry policy for failed publish attempts.

use std::time::Duration;

/// Exponential backoff and attempt budget for scheduled events.
///
/// The delay after the `n`-th failed attempt (1-based) is
/// `base * 2^(n - 1)`, capped at `max_delay`. With the defaults
/// (base 30s, max 1800s):
///
/// | Attempt | Delay  |
/// |---------|--------|
/// | 1       | 30s    |
/// | 2       | 60s    |
/// | 3       | 120s   |
/// | 4       | 240s   |
/// | 5       | 480s   |
/// | 6       | 960s   |
/// | 7+      | 1800s (capped) |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed before an event is parked in the terminal error state.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_PUBLISH_ATTEMPTS,
            base: Duration::from_secs(crate::DEFAULT_RETRY_BASE_SECONDS),
            max_delay: Duration::from_secs(crate::DEFAULT_RETRY_MAX_SECONDS),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) has failed.
    ///
    /// `attempt` must be at least 1. Zero is a caller bug; it trips a debug
    /// assertion and yields no delay in release builds.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 1, "attempt numbers are 1-based");
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base.as_millis().min(u64::MAX as u128) as u64;
        let max_ms = self.max_delay.as_millis().min(u64::MAX as u128) as u64;
        let multiplier = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

        Duration::from_millis(delay_ms)
    }

    /// Whether `attempt` used up the budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

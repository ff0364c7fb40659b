//! Bounded retry policy for transport failures.

use std::time::Duration;

/// Default number of attempts per fetch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How many times a fetch is attempted and how long to wait in between.
///
/// Only transport failures are retried. Any HTTP response, including 5xx,
/// ends the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before each retry. Zero retries immediately.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to sleep before the next attempt, if any.
    pub fn delay(&self) -> Option<Duration> {
        (!self.backoff.is_zero()).then_some(self.backoff)
    }
}

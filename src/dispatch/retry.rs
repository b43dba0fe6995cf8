//! Retry policy for dispatched writes.

use crate::error::Error;
use std::time::Duration;

/// Exponential retry for retryable errors only.
///
/// With the defaults a write is tried 3 times, 2 s then 4 s apart; the
/// delay doubles up to `max_delay`. A `Retry-After` longer than the backoff
/// wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Whether attempt `attempt` (0-based) failing with `error` gets another try.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &Error) -> bool {
        error.is_retryable() && attempt + 1 < self.max_attempts
    }

    /// Pause after attempt `attempt` failed with `error`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &Error) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        match error {
            Error::RateLimited {
                retry_after: Some(retry_after),
            } => backoff.max(*retry_after),
            _ => backoff,
        }
    }
}

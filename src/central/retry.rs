//! Retry policy for Central RPCs
//!
//! Attempts are numbered from zero. With `max_retries = n` at most `n`
//! attempts run, and at least one always does.

use crate::config::CentralConfig;
use std::time::Duration;

/// Attempt count and exponential backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Build a policy; bounds are validated with the configuration
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Policy from the Central configuration section
    pub fn from_config(config: &CentralConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff,
            config.max_backoff,
        )
    }

    /// Configured number of retries
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Number of attempts a call gets; zero retries still means one attempt
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Whether another attempt may follow `attempt`
    pub fn should_retry(&self, attempt: i64) -> bool {
        attempt < i64::from(self.max_retries) - 1
    }

    /// Backoff before the attempt following `attempt`
    ///
    /// `initial_backoff * 2^attempt`, capped at `max_backoff`. Negative
    /// attempts are treated as attempt zero.
    pub fn next_backoff(&self, attempt: i64) -> Duration {
        let attempt = attempt.max(0);
        if attempt >= 32 {
            return self.max_backoff;
        }

        let factor = 1u32 << attempt;
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |backoff| backoff.min(self.max_backoff))
    }
}

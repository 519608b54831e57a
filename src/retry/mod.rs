//! Retry policy and executor.
//!
//! This module provides bounded retries with exponential backoff for calls
//! into the tracing service. A process-wide [`RetryPolicy`] lives on the
//! [`RetryExecutor`]; individual calls may override parts of it through
//! [`RetryOverrides`].

pub mod executor;
pub mod sleeper;

use std::time::Duration;

pub use executor::RetryExecutor;
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};

/// Configuration for retry behavior with exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Always at least 1.
    /// Default: 3
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for each attempt after that.
    /// Default: 1000ms
    pub retry_delay: Duration,
    /// Log every failed attempt, not only the final failure.
    /// Default: false
    pub detailed_logging: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            detailed_logging: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy, clamping `max_retries` to at least one attempt.
    pub fn new(max_retries: u32, retry_delay: Duration, detailed_logging: bool) -> Self {
        Self {
            max_retries: max_retries.max(1),
            retry_delay,
            detailed_logging,
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Sets the base retry delay.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Sets whether each failed attempt is logged.
    pub fn with_detailed_logging(mut self, enabled: bool) -> Self {
        self.detailed_logging = enabled;
        self
    }

    /// Returns this policy with every field present in `overrides` replaced.
    pub fn merge(&self, overrides: &RetryOverrides) -> Self {
        Self {
            max_retries: overrides.max_retries.unwrap_or(self.max_retries).max(1),
            retry_delay: overrides.retry_delay.unwrap_or(self.retry_delay),
            detailed_logging: overrides
                .detailed_logging
                .unwrap_or(self.detailed_logging),
        }
    }

    /// Calculates the delay after a failed attempt using exponential backoff.
    ///
    /// The delay is `retry_delay * 2^(attempt - 1)`, so with a 1s base the
    /// waits after attempts 1, 2 and 3 are 1s, 2s and 4s.
    ///
    /// # Arguments
    /// * `attempt` - The attempt that just failed (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.retry_delay;
        }

        let exponent = (attempt - 1).min(31); // Prevent overflow
        let multiplier = 1u64 << exponent;
        let base_millis = self.retry_delay.as_millis() as u64;
        Duration::from_millis(base_millis.saturating_mul(multiplier))
    }
}

/// Per-call overrides merged over the executor's default policy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryOverrides {
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub detailed_logging: Option<bool>,
}

impl RetryOverrides {
    /// No overrides; the default policy applies unchanged.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = Some(retry_delay);
        self
    }

    pub fn detailed_logging(mut self, enabled: bool) -> Self {
        self.detailed_logging = Some(enabled);
        self
    }
}

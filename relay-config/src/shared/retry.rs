use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Retry policy for operations that may fail transiently, such as channel
/// subscriptions and watch stream restarts.
///
/// Delays grow exponentially by `backoff_factor` starting from
/// `initial_delay_ms` and are capped at `max_delay_ms`. `max_attempts`
/// bounds operations that are allowed to give up; loops that must never
/// give up (like the watch restart loop) use only the delay schedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Delay, in milliseconds, before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound on the delay between retries, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f32,
}

impl RetryConfig {
    /// Validates the retry policy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::MaxAttemptsZero);
        }
        if self.backoff_factor < 1.0 {
            return Err(ValidationError::BackoffFactorTooSmall);
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InitialDelayExceedsMax);
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

use rand::Rng;
use std::time::Duration;

use relay_config::shared::RetryConfig;

/// Exponential retry schedule with jitter.
///
/// Delays grow by `backoff_factor` starting from `initial_delay_ms` and are
/// capped at `max_delay_ms`. Each delay is scaled by a random factor in
/// `[0.5, 1.0]` so that retries from many workers spread out instead of
/// synchronizing against the same upstream.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Returns the delay to wait before the next attempt, or `None` once the
    /// configured `max_attempts` retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }

        let delay = self.delay_for_attempt(self.attempts);
        self.attempts += 1;

        Some(delay)
    }

    /// Returns the delay for the next attempt without ever exhausting.
    ///
    /// Used by loops that must keep retrying for the lifetime of the process,
    /// where only the delay schedule applies and `max_attempts` does not.
    pub fn next_delay_unbounded(&mut self) -> Duration {
        let delay = self.delay_for_attempt(self.attempts);
        self.attempts = self.attempts.saturating_add(1);

        delay
    }

    /// Resets the schedule after successful progress.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay_ms as f64
            * f64::from(self.config.backoff_factor).powi(attempt.min(31) as i32);
        let capped = base.min(self.config.max_delay_ms as f64);
        let jittered = capped * rand::rng().random_range(0.5..=1.0);

        Duration::from_millis(jittered as u64)
    }
}

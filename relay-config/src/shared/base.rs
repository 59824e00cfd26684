use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The retry policy must allow at least one attempt.
    #[error("`retry.max_attempts` cannot be zero")]
    MaxAttemptsZero,
    /// Backoff must not shrink delays between attempts.
    #[error("`retry.backoff_factor` must be at least 1.0")]
    BackoffFactorTooSmall,
    /// The delay window must be well-formed.
    #[error("`retry.initial_delay_ms` cannot exceed `retry.max_delay_ms`")]
    InitialDelayExceedsMax,
    /// A namespace scope, when set, must name a namespace.
    #[error("`watch.namespace` cannot be empty when set")]
    EmptyWatchNamespace,
    /// A watch session timeout of zero would loop on reconnects.
    #[error("`watch.timeout_secs` cannot be zero")]
    WatchTimeoutZero,
}

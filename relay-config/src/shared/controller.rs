use serde::{Deserialize, Serialize};

use crate::shared::{RetryConfig, SourceConfig, ValidationError};

/// Complete configuration for the relay controller service.
///
/// Aggregates everything required to run the controller: the message channel
/// backend, trigger watch settings, and the shared retry policy. Typically
/// loaded from configuration files at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControllerConfig {
    /// Configuration for the message channel backend.
    pub source: SourceConfig,
    /// Configuration for the trigger resource watch.
    #[serde(default)]
    pub watch: WatchConfig,
    /// Retry policy for watch restarts and worker channel subscriptions.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ControllerConfig {
    /// Validates the complete controller configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.watch.validate()?;
        self.retry.validate()
    }
}

/// Settings for the trigger resource watch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Namespace whose triggers are watched.
    ///
    /// When unset, triggers are watched across all namespaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Server-side timeout for a single watch session, in seconds.
    ///
    /// The watch reconnects from the last cursor when a session expires, so
    /// this bounds how long a silent connection lingers. When unset, the
    /// server default applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

impl WatchConfig {
    /// Validates the watch settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(namespace) = &self.namespace
            && namespace.is_empty()
        {
            return Err(ValidationError::EmptyWatchNamespace);
        }
        if self.timeout_secs == Some(0) {
            return Err(ValidationError::WatchTimeoutZero);
        }

        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;

/// Configuration for the message channel the trigger workers consume from.
///
/// Each variant corresponds to a supported channel backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    /// In-process channel for local runs and tests.
    Memory,
    /// Google Cloud Pub/Sub subscriptions.
    ///
    /// The project and subscription consumed by each worker come from the
    /// trigger resources themselves; this variant only configures how the
    /// client authenticates.
    PubSub {
        /// Service account key used to authenticate with Pub/Sub.
        ///
        /// When unset, application default credentials are used (including
        /// the Pub/Sub emulator when `PUBSUB_EMULATOR_HOST` is set).
        #[serde(skip_serializing_if = "Option::is_none")]
        service_account_key: Option<SerializableSecretString>,
    },
}

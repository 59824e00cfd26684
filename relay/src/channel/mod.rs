//! Inbound message channel abstractions and implementations.
//!
//! Provides the [`MessageSource`] trait family for pulling messages from a
//! managed pub/sub channel, with an in-memory implementation for tests and
//! local runs and a Google Cloud Pub/Sub implementation behind the `pubsub`
//! feature.

mod base;
pub mod memory;
#[cfg(feature = "pubsub")]
pub mod pubsub;

pub use base::{MessageSource, MessageSubscription, SourceMessage};

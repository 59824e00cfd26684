//! Observation of trigger resources via the list-then-watch protocol.

mod base;
pub mod kube;
pub mod memory;
pub mod reconcile;

pub use base::TriggerFeed;

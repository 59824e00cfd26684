//! Common types used throughout the relay system.
//!
//! Re-exports the trigger resource definition, change stream events, and
//! resolved service endpoints used across the controller.

mod endpoint;
mod event;
mod trigger;

pub use endpoint::*;
pub use event::*;
pub use trigger::*;

//! Delivery of channel messages to resolved service endpoints.

mod base;
pub mod http;
pub mod memory;

pub use base::{DispatchReport, Dispatcher};

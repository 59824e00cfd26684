//! Discovery of the in-cluster services a trigger fans out to.

mod base;
pub mod kube;
pub mod memory;

pub use base::ServiceResolver;

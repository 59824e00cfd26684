//! Workers that consume channels on behalf of triggers, and the registry
//! tracking them.

pub mod base;
pub mod registry;
pub mod trigger;

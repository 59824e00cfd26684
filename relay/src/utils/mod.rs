//! Small shared utilities.

pub mod backoff;

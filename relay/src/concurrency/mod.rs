//! Concurrency primitives for worker supervision and shutdown signaling.

pub mod future;
pub mod shutdown;

use std::future::Future;

use crate::error::RelayResult;

/// A trait for types that can be started as workers.
///
/// The generic parameter `H` is the handle type returned when the worker
/// starts, and `S` the state type accessible through that handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type.
    type Error;

    /// Starts the worker and returns a future that resolves to its handle.
    ///
    /// The handle can be used to monitor and control the worker's execution.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// A handle to a running worker.
pub trait WorkerHandle<S> {
    /// Returns the current state of the worker.
    ///
    /// The state is not tied to the worker's lifetime; holding it says
    /// nothing about whether the worker is still running.
    fn state(&self) -> S;

    /// Returns a future that resolves when the worker completes, with the
    /// worker's terminal result.
    fn wait(self) -> impl Future<Output = RelayResult<()>> + Send;
}

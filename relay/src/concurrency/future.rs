use core::pin::Pin;
use core::task::{Context, Poll};
use futures::FutureExt;
use futures::future::{BoxFuture, CatchUnwind};
use futures::ready;
use pin_project_lite::pin_project;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::error::{ErrorKind, RelayError, RelayResult};
use crate::relay_error;
use crate::workers::registry::TriggerRegistry;

pin_project! {
    /// A future wrapper that reports worker termination to the trigger registry.
    ///
    /// Panics raised by the wrapped future are caught and converted into errors so
    /// that a failing worker cannot take down the process. Whichever way the
    /// wrapped future settles, the terminal result is reported to the registry
    /// before this future resolves, so the registry also learns about workers
    /// that die without having been asked to stop.
    #[must_use = "futures do nothing unless polled"]
    pub struct ReactiveFuture<F> {
        #[pin]
        future: CatchUnwind<AssertUnwindSafe<F>>,
        trigger_name: Option<String>,
        registry: TriggerRegistry,
        report: Option<BoxFuture<'static, RelayResult<()>>>,
    }
}

impl<F> ReactiveFuture<F>
where
    F: Future<Output = RelayResult<()>>,
{
    /// Wraps `future` so that its terminal result is reported to `registry`
    /// under `trigger_name`.
    pub fn new(future: F, trigger_name: String, registry: TriggerRegistry) -> Self {
        Self {
            future: AssertUnwindSafe(future).catch_unwind(),
            trigger_name: Some(trigger_name),
            registry,
            report: None,
        }
    }
}

impl<F> Future for ReactiveFuture<F>
where
    F: Future<Output = RelayResult<()>>,
{
    type Output = RelayResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        loop {
            // Once the wrapped future has settled, the remaining work is to drive
            // the reporting future, which yields the original result back.
            if let Some(report) = this.report.as_mut() {
                return report.as_mut().poll(cx);
            }

            let result = match ready!(this.future.as_mut().poll(cx)) {
                Ok(result) => result,
                Err(panic) => Err(panic_to_error(panic)),
            };

            let Some(trigger_name) = this.trigger_name.take() else {
                return Poll::Ready(result);
            };

            let registry = this.registry.clone();
            *this.report = Some(
                async move {
                    registry.mark_worker_finished(&trigger_name, &result).await;
                    result
                }
                .boxed(),
            );
        }
    }
}

fn panic_to_error(panic: Box<dyn Any + Send>) -> RelayError {
    let message = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };

    relay_error!(
        ErrorKind::TriggerWorkerPanic,
        "Trigger worker panicked",
        message
    )
}

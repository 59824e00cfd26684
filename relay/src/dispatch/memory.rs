use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::dispatch::base::{DispatchReport, Dispatcher};
use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;
use crate::types::ServiceEndpoint;

#[derive(Debug, Default)]
struct Inner {
    /// Every successful delivery, in dispatch order.
    dispatches: Vec<(ServiceEndpoint, Bytes)>,
    /// Endpoint names whose deliveries currently fail.
    failing_endpoints: HashSet<String>,
    /// Whether the next dispatch call panics instead of delivering.
    panic_next: bool,
    /// Conditions waiting for the total delivery count to reach a threshold.
    dispatch_conditions: Vec<(usize, Arc<Notify>)>,
}

impl Inner {
    fn check_dispatch_conditions(&mut self) {
        let dispatched = self.dispatches.len();
        self.dispatch_conditions.retain(|(expected, notify)| {
            let reached = dispatched >= *expected;
            if reached {
                notify.notify_one();
            }
            !reached
        });
    }
}

/// In-process dispatcher recording every delivery it makes.
#[derive(Debug, Clone)]
pub struct MemoryDispatcher {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Makes deliveries to the named endpoint fail.
    pub async fn fail_endpoint(&self, name: &str) {
        let mut inner = self.inner.lock().await;
        inner.failing_endpoints.insert(name.to_string());
    }

    /// Makes the next dispatch call panic, to exercise worker supervision.
    pub async fn panic_on_next_dispatch(&self) {
        let mut inner = self.inner.lock().await;
        inner.panic_next = true;
    }

    /// Returns every successful delivery so far.
    pub async fn dispatches(&self) -> Vec<(ServiceEndpoint, Bytes)> {
        let inner = self.inner.lock().await;
        inner.dispatches.clone()
    }

    /// Returns a [`Notify`] that fires once `count` deliveries have been made
    /// in total.
    pub async fn notify_on_dispatches(&self, count: usize) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner.dispatch_conditions.push((count, notify.clone()));

        // The expected count may already be reached by the time the condition
        // is registered, in which case it must fire immediately or it would
        // never fire at all.
        inner.check_dispatch_conditions();

        notify
    }
}

impl Default for MemoryDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for MemoryDispatcher {
    async fn dispatch(
        &self,
        payload: Bytes,
        endpoints: &[ServiceEndpoint],
    ) -> RelayResult<DispatchReport> {
        let mut inner = self.inner.lock().await;

        if inner.panic_next {
            inner.panic_next = false;
            panic!("dispatcher told to panic");
        }

        let mut report = DispatchReport::new(endpoints.len());

        for endpoint in endpoints {
            if inner.failing_endpoints.contains(&endpoint.name) {
                report.record_failure(
                    endpoint.clone(),
                    relay_error!(
                        ErrorKind::DispatchFailed,
                        "Failed to deliver message to endpoint",
                        format!("endpoint {} is failing", endpoint.url())
                    ),
                );
            } else {
                inner.dispatches.push((endpoint.clone(), payload.clone()));
            }
        }

        inner.check_dispatch_conditions();

        Ok(report)
    }
}

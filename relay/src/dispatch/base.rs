use bytes::Bytes;
use std::future::Future;

use crate::error::{RelayError, RelayResult};
use crate::types::ServiceEndpoint;

/// Outcome of fanning one message out to a set of endpoints.
///
/// Delivery is fire and forget, so the report is informational today, but it
/// is structured enough that a delivery-guaranteeing mode could be built on
/// top of it without changing the [`Dispatcher`] contract.
#[derive(Debug)]
pub struct DispatchReport {
    attempted: usize,
    failures: Vec<(ServiceEndpoint, RelayError)>,
}

impl DispatchReport {
    pub fn new(attempted: usize) -> Self {
        Self {
            attempted,
            failures: Vec::new(),
        }
    }

    /// Records that delivery to an endpoint failed.
    pub fn record_failure(&mut self, endpoint: ServiceEndpoint, error: RelayError) {
        self.failures.push((endpoint, error));
    }

    /// Number of endpoints delivery was attempted to.
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Number of endpoints the message reached.
    pub fn delivered(&self) -> usize {
        self.attempted - self.failures.len()
    }

    /// The endpoints delivery failed to, with the failure for each.
    pub fn failures(&self) -> &[(ServiceEndpoint, RelayError)] {
        &self.failures
    }
}

/// Delivers one message payload to a set of endpoints.
pub trait Dispatcher {
    /// Attempts delivery to every endpoint and reports the outcome.
    ///
    /// An empty endpoint set is not an error; it produces an empty report.
    /// Per-endpoint failures are recorded in the report rather than failing
    /// the call, so one unreachable endpoint never blocks the others.
    fn dispatch(
        &self,
        payload: Bytes,
        endpoints: &[ServiceEndpoint],
    ) -> impl Future<Output = RelayResult<DispatchReport>> + Send;
}

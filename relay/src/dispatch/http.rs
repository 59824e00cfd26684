use bytes::Bytes;
use futures::future::join_all;
use tracing::debug;

use crate::dispatch::base::{DispatchReport, Dispatcher};
use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;
use crate::types::ServiceEndpoint;

/// Dispatcher that POSTs the raw message payload to each endpoint.
///
/// Deliveries run concurrently and the responses are ignored; an endpoint
/// counts as reached as soon as it produces any HTTP response. Only transport
/// failures end up in the report.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        payload: Bytes,
        endpoints: &[ServiceEndpoint],
    ) -> RelayResult<DispatchReport> {
        let mut report = DispatchReport::new(endpoints.len());

        let deliveries = endpoints.iter().map(|endpoint| {
            let client = self.client.clone();
            let payload = payload.clone();

            async move {
                let result = client.post(endpoint.url()).body(payload).send().await;
                (endpoint, result)
            }
        });

        for (endpoint, result) in join_all(deliveries).await {
            match result {
                Ok(response) => {
                    debug!(
                        endpoint = %endpoint.url(),
                        status = %response.status(),
                        "message delivered"
                    );
                }
                Err(err) => {
                    report.record_failure(
                        endpoint.clone(),
                        relay_error!(
                            ErrorKind::DispatchFailed,
                            "Failed to deliver message to endpoint",
                            format!("endpoint {}: {err}", endpoint.url())
                        ),
                    );
                }
            }
        }

        Ok(report)
    }
}

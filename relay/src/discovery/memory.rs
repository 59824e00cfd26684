use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::discovery::base::ServiceResolver;
use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;
use crate::types::ServiceEndpoint;

#[derive(Debug, Default)]
struct Inner {
    endpoints: Vec<(BTreeMap<String, String>, ServiceEndpoint)>,
    unavailable: bool,
}

/// In-process resolver matching registered endpoints by their labels.
#[derive(Debug, Clone)]
pub struct MemoryServiceResolver {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryServiceResolver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Registers an endpoint under a set of labels.
    pub async fn register(&self, labels: &[(&str, &str)], endpoint: ServiceEndpoint) {
        let labels = labels
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        let mut inner = self.inner.lock().await;
        inner.endpoints.push((labels, endpoint));
    }

    /// Makes every resolution fail or succeed.
    pub async fn set_unavailable(&self, unavailable: bool) {
        let mut inner = self.inner.lock().await;
        inner.unavailable = unavailable;
    }
}

impl Default for MemoryServiceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceResolver for MemoryServiceResolver {
    async fn resolve(&self, selector: &str) -> RelayResult<Vec<ServiceEndpoint>> {
        let inner = self.inner.lock().await;

        if inner.unavailable {
            return Err(relay_error!(
                ErrorKind::ServiceResolutionFailed,
                "Failed to list services for selector",
                format!("selector {selector}: resolver is unavailable")
            ));
        }

        let endpoints = inner
            .endpoints
            .iter()
            .filter(|(labels, _)| selector_matches(selector, labels))
            .map(|(_, endpoint)| endpoint.clone())
            .collect();

        Ok(endpoints)
    }
}

/// Returns whether every `key=value` pair of the selector is present in the
/// labels. An empty selector matches everything.
fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    if selector.is_empty() {
        return true;
    }

    selector.split(',').all(|pair| {
        let Some((key, value)) = pair.split_once('=') else {
            return false;
        };

        labels.get(key).is_some_and(|candidate| candidate == value)
    })
}

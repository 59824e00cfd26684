use k8s_openapi::api::core::v1::Service;
use kube::Api;
use kube::api::ListParams;
use tracing::debug;

use crate::discovery::base::ServiceResolver;
use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;
use crate::types::ServiceEndpoint;

/// Resolves label selectors against the cluster's `Service` objects.
#[derive(Clone)]
pub struct KubeServiceResolver {
    services: Api<Service>,
}

impl KubeServiceResolver {
    /// Creates a resolver scoped to a namespace, or to the whole cluster when
    /// no namespace is given.
    pub fn new(client: kube::Client, namespace: Option<&str>) -> Self {
        let services = match namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };

        Self { services }
    }
}

impl ServiceResolver for KubeServiceResolver {
    async fn resolve(&self, selector: &str) -> RelayResult<Vec<ServiceEndpoint>> {
        let params = ListParams::default().labels(selector);
        let services = self.services.list(&params).await.map_err(|err| {
            relay_error!(
                ErrorKind::ServiceResolutionFailed,
                "Failed to list services for selector",
                format!("selector {selector}: {err}")
            )
        })?;

        let endpoints = services
            .items
            .iter()
            .filter_map(|service| {
                let endpoint = service_endpoint(service);
                if endpoint.is_none() {
                    debug!(
                        service = service.metadata.name.as_deref().unwrap_or_default(),
                        "skipping service without a usable name, namespace or port"
                    );
                }

                endpoint
            })
            .collect();

        Ok(endpoints)
    }
}

/// Maps a `Service` to a dispatchable endpoint.
///
/// The first declared port is used. Headless services and services without a
/// cluster IP are addressed through their cluster DNS name instead.
fn service_endpoint(service: &Service) -> Option<ServiceEndpoint> {
    let name = service.metadata.name.clone()?;
    let namespace = service.metadata.namespace.clone()?;
    let spec = service.spec.as_ref()?;
    let port = spec.ports.as_ref()?.first()?;
    let port = u16::try_from(port.port).ok()?;

    let address = match spec.cluster_ip.as_deref() {
        Some(ip) if !ip.is_empty() && ip != "None" => ip.to_string(),
        _ => format!("{name}.{namespace}"),
    };

    Some(ServiceEndpoint {
        name,
        namespace,
        address,
        port,
    })
}

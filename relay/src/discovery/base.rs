use std::future::Future;

use crate::error::RelayResult;
use crate::types::ServiceEndpoint;

/// Resolves a label selector to the service endpoints currently matching it.
///
/// Resolution happens per delivered message, so a resolver always reflects
/// the current state of the cluster rather than a snapshot taken when the
/// trigger was created.
pub trait ServiceResolver {
    /// Returns the endpoints of all services matching `selector`.
    ///
    /// `selector` uses Kubernetes label selector syntax, e.g. `app=fn1`. An
    /// empty selector matches every service in scope.
    fn resolve(&self, selector: &str)
    -> impl Future<Output = RelayResult<Vec<ServiceEndpoint>>> + Send;
}

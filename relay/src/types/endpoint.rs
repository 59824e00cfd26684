/// A resolved service endpoint that can receive dispatched messages.
///
/// Endpoints are ephemeral: they are re-resolved from the service directory
/// for every dispatched message and never cached across messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: String,
    pub namespace: String,
    /// Cluster address of the service when known, DNS name otherwise.
    pub address: String,
    pub port: u16,
}

impl ServiceEndpoint {
    /// Returns the dispatch URL for this endpoint.
    ///
    /// The URL targets the service DNS name rather than [`Self::address`], so
    /// delivery goes through cluster routing even when the resolved address
    /// has gone stale between resolution and dispatch.
    pub fn url(&self) -> String {
        format!("http://{}.{}:{}/", self.name, self.namespace, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_derivation() {
        let endpoint = ServiceEndpoint {
            name: "svc1".to_string(),
            namespace: "default".to_string(),
            address: "10.0.0.7".to_string(),
            port: 8080,
        };

        assert_eq!(endpoint.url(), "http://svc1.default:8080/");
    }
}

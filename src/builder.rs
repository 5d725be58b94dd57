//! Builder API for configuring the failover router.

use reqwest_middleware::ClientWithMiddleware;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::health::{EndpointHealthTracker, HealthConfig};
use crate::router::{DEFAULT_TIMEOUT, EndpointRegistry, FailoverRouter};
use crate::transport::{HttpTransport, Transport};
use crate::types::EndpointSet;

/// Builder for configuring a [`FailoverRouter`].
#[derive(Debug, Default)]
pub struct RouterBuilder {
    pub(crate) backends: HashMap<String, EndpointSet>,
    registry: Option<Arc<dyn EndpointRegistry>>,
    health: Option<Arc<EndpointHealthTracker>>,
    health_config: HealthConfig,
    transport: Option<Arc<dyn Transport>>,
    timeout: Option<Duration>,
}

impl RouterBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the endpoints of one logical backend using a scoped builder.
    ///
    /// Configured endpoints are tried in the order they are added. Calling
    /// this again for the same id replaces the earlier configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use gateway_admission::FailoverRouter;
    ///
    /// let router = FailoverRouter::builder()
    ///     .backend("1", |b| {
    ///         b.self_hosted("http://geth.internal:8545")
    ///             .endpoint("https://eth.llamarpc.com")
    ///             .endpoint("https://rpc.ankr.com/eth")
    ///     })
    ///     .backend("8453", |b| b.endpoint("https://mainnet.base.org"))
    ///     .build();
    /// ```
    #[must_use]
    pub fn backend<F>(mut self, backend_id: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(BackendBuilder) -> BackendBuilder,
    {
        let configured = configure(BackendBuilder::default());
        self.backends.insert(backend_id.into(), configured.into_set());
        self
    }

    /// Add a pre-configured endpoint set.
    #[must_use]
    pub fn add_backend(mut self, backend_id: impl Into<String>, endpoints: EndpointSet) -> Self {
        self.backends.insert(backend_id.into(), endpoints);
        self
    }

    /// Resolve backends through an external registry instead of
    /// [`backend`](Self::backend).
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn EndpointRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share an existing health tracker, e.g. between several routers.
    ///
    /// Takes precedence over [`health_config`](Self::health_config).
    #[must_use]
    pub fn health_tracker(mut self, tracker: Arc<EndpointHealthTracker>) -> Self {
        self.health = Some(tracker);
        self
    }

    #[must_use]
    pub fn health_config(mut self, config: HealthConfig) -> Self {
        self.health_config = config;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Send requests through a reqwest client with middleware.
    #[must_use]
    pub fn client(self, client: ClientWithMiddleware) -> Self {
        self.transport(HttpTransport::new(client))
    }

    /// Set the per-attempt timeout.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "timeout must be greater than 0");
        self.timeout = Some(timeout);
        self
    }

    /// Build the router.
    ///
    /// # Panics
    ///
    /// Panics if both a registry and inline backends are configured.
    ///
    /// # Warnings
    ///
    /// If the `tracing` feature is enabled, this method warns about inline
    /// backends with no endpoints, since every request to them will fail with
    /// [`GatewayError::NoEndpointsAvailable`](crate::GatewayError::NoEndpointsAvailable).
    #[must_use]
    pub fn build(self) -> FailoverRouter {
        assert!(
            self.registry.is_none() || self.backends.is_empty(),
            "configure backends with either .backend() or .registry(), not both"
        );

        #[cfg(feature = "tracing")]
        self.warn_unroutable_backends();

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(self.backends) as Arc<dyn EndpointRegistry>);

        FailoverRouter {
            registry,
            health: self
                .health
                .unwrap_or_else(|| Arc::new(EndpointHealthTracker::with_config(self.health_config))),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(HttpTransport::default())),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    #[cfg(feature = "tracing")]
    fn warn_unroutable_backends(&self) {
        for (backend, set) in &self.backends {
            if set.is_empty() {
                tracing::warn!(
                    backend = %backend,
                    "backend has no endpoints configured; requests to it will always fail"
                );
            }
            if let Some(self_hosted) = &set.self_hosted {
                if set.configured.contains(self_hosted) {
                    tracing::debug!(
                        backend = %backend,
                        endpoint = %self_hosted,
                        "self-hosted endpoint also listed as configured; treated as separate candidates"
                    );
                }
            }
        }
    }
}

/// Builder for the endpoints of a single backend.
///
/// Created by [`RouterBuilder::backend`].
#[derive(Debug, Default, Clone)]
pub struct BackendBuilder {
    self_hosted: Option<String>,
    configured: Vec<String>,
}

impl BackendBuilder {
    /// Set the operator-run endpoint, preferred while healthy.
    #[must_use]
    pub fn self_hosted(mut self, url: impl Into<String>) -> Self {
        self.self_hosted = Some(url.into());
        self
    }

    /// Append a configured endpoint. The first one added is the primary.
    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.configured.push(url.into());
        self
    }

    #[must_use]
    pub fn endpoints<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configured.extend(urls.into_iter().map(Into::into));
        self
    }

    fn into_set(self) -> EndpointSet {
        EndpointSet {
            self_hosted: self.self_hosted,
            configured: self.configured,
        }
    }
}

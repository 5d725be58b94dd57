//! Priority failover across the endpoints of a logical backend.

use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::builder::RouterBuilder;
use crate::error::GatewayError;
use crate::health::{EndpointHealthSnapshot, EndpointHealthTracker};
use crate::transport::{Transport, TransportError};
use crate::types::{EndpointSet, ProxyRequest, ProxyResponse};

/// Per-attempt timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest batch accepted by [`FailoverRouter::proxy_batch`].
pub const MAX_BATCH_SIZE: usize = 100;

/// Supplies the endpoints of each logical backend.
pub trait EndpointRegistry: Send + Sync + fmt::Debug {
    /// Returns `None` for unknown backends.
    fn endpoint_set(&self, backend_id: &str) -> Option<EndpointSet>;
}

impl EndpointRegistry for HashMap<String, EndpointSet> {
    fn endpoint_set(&self, backend_id: &str) -> Option<EndpointSet> {
        self.get(backend_id).cloned()
    }
}

/// One endpoint in an attempt list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub self_hosted: bool,
}

/// Outcome of a successful proxied call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResult {
    pub response: ProxyResponse,
    pub latency_ms: u64,
    pub endpoint_used: String,
    /// `true` unless the first candidate served the request and it was the
    /// self-hosted endpoint.
    pub used_fallback: bool,
}

/// Routes requests to the first healthy endpoint that answers.
///
/// Candidates are always tried in priority order, never reordered by latency.
/// Every attempt outcome is recorded in the shared [`EndpointHealthTracker`].
///
/// Clones share the same registry, health state and transport.
#[derive(Debug, Clone)]
pub struct FailoverRouter {
    pub(crate) registry: Arc<dyn EndpointRegistry>,
    pub(crate) health: Arc<EndpointHealthTracker>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) timeout: Duration,
}

impl FailoverRouter {
    /// Create a new builder for configuring the router.
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn health_tracker(&self) -> &Arc<EndpointHealthTracker> {
        &self.health
    }

    /// Health of every endpoint that has failed at least once.
    #[must_use]
    pub fn endpoint_health_snapshot(&self) -> HashMap<String, EndpointHealthSnapshot> {
        self.health.snapshot()
    }

    /// Ordered, currently healthy candidates for `backend_id`.
    ///
    /// A healthy self-hosted endpoint comes first, followed by the healthy
    /// configured endpoints in order. An unhealthy self-hosted endpoint is
    /// left out entirely. Duplicate URLs are kept as separate candidates.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnsupportedBackend`] for unknown backends.
    pub fn resolve_endpoints(&self, backend_id: &str) -> Result<Vec<Candidate>, GatewayError> {
        let set = self
            .registry
            .endpoint_set(backend_id)
            .ok_or_else(|| GatewayError::UnsupportedBackend(backend_id.to_string()))?;

        let self_hosted = set
            .self_hosted
            .filter(|url| self.health.is_healthy(url))
            .map(|url| Candidate {
                url,
                self_hosted: true,
            });

        let configured = set
            .configured
            .into_iter()
            .filter(|url| self.health.is_healthy(url))
            .map(|url| Candidate {
                url,
                self_hosted: false,
            });

        Ok(self_hosted.into_iter().chain(configured).collect())
    }

    /// Send `request` to the first candidate of `backend_id` that succeeds.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnsupportedBackend`]: unknown backend, nothing sent.
    /// - [`GatewayError::NoEndpointsAvailable`]: no healthy candidate, nothing sent.
    /// - [`GatewayError::AllEndpointsFailed`]: every candidate failed; carries
    ///   the last failure.
    pub async fn proxy(
        &self,
        backend_id: &str,
        request: &ProxyRequest,
    ) -> Result<ProxyResult, GatewayError> {
        let candidates = self.resolve_endpoints(backend_id)?;
        if candidates.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!(backend = backend_id, "no healthy endpoints to try");
            return Err(GatewayError::NoEndpointsAvailable(backend_id.to_string()));
        }

        let mut last_error: Option<TransportError> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let started = Instant::now();
            match self.attempt(&candidate.url, request).await {
                Ok(response) => {
                    self.health.record_success(&candidate.url);
                    return Ok(ProxyResult {
                        response,
                        latency_ms: u64::try_from(started.elapsed().as_millis())
                            .unwrap_or(u64::MAX),
                        endpoint_used: candidate.url.clone(),
                        used_fallback: index > 0 || !candidate.self_hosted,
                    });
                }
                Err(err) => {
                    self.health.record_failure(&candidate.url);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        backend = backend_id,
                        endpoint = %candidate.url,
                        attempt = index + 1,
                        of = candidates.len(),
                        error = %err,
                        "endpoint attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(GatewayError::AllEndpointsFailed {
            last_error: last_error.map_or_else(String::new, |err| err.to_string()),
        })
    }

    /// Proxy each request independently and concurrently.
    ///
    /// Results are in input order. One item failing does not affect others.
    ///
    /// # Errors
    ///
    /// The whole batch is rejected, before any network call, if it is empty,
    /// larger than [`MAX_BATCH_SIZE`], or addressed to an unknown backend.
    pub async fn proxy_batch(
        &self,
        backend_id: &str,
        requests: &[ProxyRequest],
    ) -> Result<Vec<Result<ProxyResult, GatewayError>>, GatewayError> {
        if requests.is_empty() {
            return Err(GatewayError::EmptyBatch);
        }
        if requests.len() > MAX_BATCH_SIZE {
            return Err(GatewayError::BatchTooLarge {
                size: requests.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        if self.registry.endpoint_set(backend_id).is_none() {
            return Err(GatewayError::UnsupportedBackend(backend_id.to_string()));
        }

        Ok(join_all(requests.iter().map(|request| self.proxy(backend_id, request))).await)
    }

    async fn attempt(
        &self,
        endpoint: &str,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, TransportError> {
        tokio::time::timeout(self.timeout, self.transport.send(endpoint, request))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}

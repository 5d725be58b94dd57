//! Admission followed by failover routing.

use crate::admission::AdmissionPipeline;
use crate::error::GatewayError;
use crate::middleware::AdmissionContext;
use crate::router::{FailoverRouter, ProxyResult};
use crate::types::ProxyRequest;

/// Admits a request against its resource, then routes it to the resource's
/// backend.
///
/// Rejected requests never reach the network and are not counted. Admitted
/// requests are counted before routing, so a request that fails on every
/// endpoint still consumes quota.
#[derive(Debug, Clone)]
pub struct Gateway {
    admission: AdmissionPipeline,
    router: FailoverRouter,
}

impl Gateway {
    /// Combine an admission pipeline with a router.
    ///
    /// Idle usage keys are only swept if
    /// [`RateLimitStore::spawn_sweeper`](crate::RateLimitStore::spawn_sweeper)
    /// was started on the pipeline's store.
    #[must_use]
    pub fn new(admission: AdmissionPipeline, router: FailoverRouter) -> Self {
        Self { admission, router }
    }

    #[must_use]
    pub fn admission(&self) -> &AdmissionPipeline {
        &self.admission
    }

    #[must_use]
    pub fn router(&self) -> &FailoverRouter {
        &self.router
    }

    /// Admit `request` for the caller in `context` and forward it to the
    /// resource's backend.
    ///
    /// The path and method checked by admission are the ones that are sent.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Denied`] if admission fails, otherwise any error from
    /// [`FailoverRouter::proxy`].
    pub async fn forward(
        &self,
        context: &AdmissionContext,
        request: &ProxyRequest,
    ) -> Result<ProxyResult, GatewayError> {
        let access = context.access(&request.path, request.method.as_str());
        let resource = self.admission.admit(&access).await?;
        self.router.proxy(&resource.backend_id, request).await
    }
}

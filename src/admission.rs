//! Admission pipeline: access policy, then quota.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::Denial;
use crate::store::RateLimitStore;
use crate::types::Resource;

/// Supplies resources by id.
#[async_trait]
pub trait ResourceStore: Send + Sync + fmt::Debug {
    /// Returns `None` for unknown resources.
    async fn resource(&self, resource_id: &str) -> Option<Arc<Resource>>;
}

/// A [`ResourceStore`] held in memory.
#[derive(Debug, Default)]
pub struct InMemoryResources {
    resources: DashMap<String, Arc<Resource>>,
}

impl InMemoryResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a resource.
    pub fn insert(&self, resource: Resource) {
        self.resources
            .insert(resource.id.clone(), Arc::new(resource));
    }

    pub fn remove(&self, resource_id: &str) -> Option<Arc<Resource>> {
        self.resources.remove(resource_id).map(|(_, r)| r)
    }
}

#[async_trait]
impl ResourceStore for InMemoryResources {
    async fn resource(&self, resource_id: &str) -> Option<Arc<Resource>> {
        self.resources.get(resource_id).map(|r| Arc::clone(r.value()))
    }
}

/// The request attributes admission decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest<'a> {
    /// Who is calling, e.g. a wallet address.
    pub subject: &'a str,
    pub resource_id: &'a str,
    pub path: &'a str,
    pub method: &'a str,
    /// Caller's origin domain, checked only when present.
    pub origin_domain: Option<&'a str>,
}

impl<'a> AccessRequest<'a> {
    #[must_use]
    pub fn new(subject: &'a str, resource_id: &'a str, path: &'a str, method: &'a str) -> Self {
        Self {
            subject,
            resource_id,
            path,
            method,
            origin_domain: None,
        }
    }

    #[must_use]
    pub fn origin(mut self, domain: &'a str) -> Self {
        self.origin_domain = Some(domain);
        self
    }
}

/// Serializable admission outcome for HTTP handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl From<Result<(), Denial>> for AccessCheckResult {
    fn from(result: Result<(), Denial>) -> Self {
        match result {
            Ok(()) => Self {
                allowed: true,
                reason: None,
                code: None,
                retry_after_seconds: None,
            },
            Err(denial) => Self {
                allowed: false,
                reason: Some(denial.to_string()),
                code: Some(denial.code()),
                retry_after_seconds: denial.retry_after_secs(),
            },
        }
    }
}

/// Key under which a subject's usage of a resource is counted.
#[must_use]
pub fn usage_key(subject: &str, resource_id: &str) -> String {
    format!("{subject}:{resource_id}")
}

/// Decides whether a request against a proxied resource is admitted.
///
/// Checks run cheapest first and stop at the first failure: resource
/// active, origin domain, endpoint, method, then the stateful rate limit.
///
/// Clones share the same resource store and usage counters.
#[derive(Debug, Clone)]
pub struct AdmissionPipeline {
    resources: Arc<dyn ResourceStore>,
    limits: Arc<RateLimitStore>,
}

impl AdmissionPipeline {
    /// Admission over `resources`, counting usage in `limits`.
    ///
    /// The store does not sweep idle keys on its own; call
    /// [`RateLimitStore::spawn_sweeper`] on `limits` to keep memory bounded
    /// by activity rather than only by capacity.
    #[must_use]
    pub fn new(resources: Arc<dyn ResourceStore>, limits: Arc<RateLimitStore>) -> Self {
        Self { resources, limits }
    }

    #[must_use]
    pub fn rate_limits(&self) -> &Arc<RateLimitStore> {
        &self.limits
    }

    /// Look up the resource and run every check without counting the request.
    ///
    /// Call [`increment_usage`](Self::increment_usage) once the request is
    /// actually served, or use [`admit`](Self::admit) to do both atomically.
    pub async fn check_access(&self, request: &AccessRequest<'_>) -> Result<(), Denial> {
        let resource = self.load(request.resource_id).await?;
        self.evaluate(&resource, request)
    }

    /// Count one request for `subject` against `resource_id`.
    pub fn increment_usage(&self, subject: &str, resource_id: &str) {
        self.limits.increment(&usage_key(subject, resource_id));
    }

    /// Run every check and count the request if admitted.
    ///
    /// Returns the resource so the caller can route to its backend.
    pub async fn admit(&self, request: &AccessRequest<'_>) -> Result<Arc<Resource>, Denial> {
        let resource = self.load(request.resource_id).await?;
        Self::check_policy(&resource, request)?;
        self.limits.check_and_increment(
            &usage_key(request.subject, &resource.id),
            &resource.limits,
        )?;
        Ok(resource)
    }

    /// Run every check against an already loaded resource.
    pub fn evaluate(&self, resource: &Resource, request: &AccessRequest<'_>) -> Result<(), Denial> {
        Self::check_policy(resource, request)?;
        self.limits
            .check_limit(&usage_key(request.subject, &resource.id), &resource.limits)
    }

    async fn load(&self, resource_id: &str) -> Result<Arc<Resource>, Denial> {
        self.resources
            .resource(resource_id)
            .await
            .ok_or_else(|| Denial::ResourceNotFound(resource_id.to_string()))
    }

    fn check_policy(resource: &Resource, request: &AccessRequest<'_>) -> Result<(), Denial> {
        if !resource.active {
            return Err(Denial::ResourceInactive(resource.id.clone()));
        }
        if let Some(domain) = request.origin_domain {
            resource.policy.domain_allowed(domain)?;
        }
        resource.policy.endpoint_allowed(request.path)?;
        resource.policy.method_allowed(request.method)
    }
}

//! Error types for admission and routing.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::window::Window;

/// Which part of an access policy rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    /// The origin domain of the caller.
    Domain,
    /// The requested path on the proxied API.
    Endpoint,
    /// The HTTP method.
    Method,
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Domain => "domain",
            Self::Endpoint => "endpoint",
            Self::Method => "method",
        })
    }
}

/// Why a request was not admitted.
///
/// Admission rejections are terminal for the request. Only
/// [`Denial::RateLimited`] is retryable, after the stated delay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    /// No resource is registered under the requested id.
    #[error("resource {0} not found")]
    ResourceNotFound(String),

    /// The resource exists but is not accepting traffic.
    #[error("resource {0} is not active")]
    ResourceInactive(String),

    #[error("domain {0} is blocked")]
    DomainBlocked(String),

    #[error("domain {0} is not in the allowlist")]
    DomainNotAllowed(String),

    #[error("endpoint {0} is blocked")]
    EndpointBlocked(String),

    #[error("endpoint {0} is not in the allowlist")]
    EndpointNotAllowed(String),

    /// The verb is not one of the five proxied methods.
    #[error("method {0} is not supported")]
    UnsupportedMethod(String),

    #[error("method {0} is not allowed")]
    MethodNotAllowed(String),

    /// A usage window is exhausted.
    #[error("rate limit exceeded for {window} window, retry after {retry_after_secs}s")]
    RateLimited {
        window: Window,
        retry_after_secs: u64,
    },
}

impl Denial {
    /// The policy scope that produced this denial, if it came from the access policy.
    #[must_use]
    pub fn scope(&self) -> Option<AccessScope> {
        match self {
            Self::DomainBlocked(_) | Self::DomainNotAllowed(_) => Some(AccessScope::Domain),
            Self::EndpointBlocked(_) | Self::EndpointNotAllowed(_) => Some(AccessScope::Endpoint),
            Self::UnsupportedMethod(_) | Self::MethodNotAllowed(_) => Some(AccessScope::Method),
            Self::ResourceNotFound(_) | Self::ResourceInactive(_) | Self::RateLimited { .. } => {
                None
            }
        }
    }

    /// Stable machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::ResourceInactive(_) => "resource_inactive",
            Self::DomainBlocked(_) => "domain_blocked",
            Self::DomainNotAllowed(_) => "domain_not_allowed",
            Self::EndpointBlocked(_) => "endpoint_blocked",
            Self::EndpointNotAllowed(_) => "endpoint_not_allowed",
            Self::UnsupportedMethod(_) => "method_unsupported",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::RateLimited { .. } => "rate_limited",
        }
    }

    /// Seconds the caller should wait before retrying, for quota rejections.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Errors produced by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A glob pattern is longer than the compiler accepts.
    #[error("pattern is {len} characters, maximum is {max}")]
    PatternTooLong { len: usize, max: usize },

    /// A glob pattern translated to a regex that exceeds the compiled size limit.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The request was not admitted.
    #[error("access denied: {0}")]
    Denied(#[from] Denial),

    /// The logical backend id is not known to the endpoint registry.
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Nothing to try: every endpoint is absent or unhealthy.
    #[error("no endpoints available for backend {0}")]
    NoEndpointsAvailable(String),

    /// Every candidate endpoint was tried and failed.
    #[error("no backend available: {last_error}")]
    AllEndpointsFailed { last_error: String },

    #[error("batch of {size} requests exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("batch must contain at least one request")]
    EmptyBatch,

    /// A request reached the admission middleware without an [`AdmissionContext`](crate::AdmissionContext).
    #[error("request carries no admission context")]
    MissingAdmissionContext,
}

impl GatewayError {
    /// The admission denial, if this error is one.
    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Denied(denial) => Some(denial),
            _ => None,
        }
    }
}

impl From<GatewayError> for reqwest_middleware::Error {
    fn from(err: GatewayError) -> Self {
        reqwest_middleware::Error::Middleware(err.into())
    }
}

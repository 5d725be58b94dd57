//! Per-resource access policies.
//!
//! A policy is described by a plain [`AccessPolicyConfig`] and compiled once,
//! when the resource is registered, into an immutable [`AccessPolicy`].
//! Block lists always win over allow lists.

use std::collections::HashSet;

use crate::error::{Denial, GatewayError};
use crate::pattern::PatternSet;
use crate::types::HttpMethod;

/// Raw glob lists and allowed verbs for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicyConfig {
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub allowed_endpoints: Vec<String>,
    pub blocked_endpoints: Vec<String>,
    pub allowed_methods: HashSet<HttpMethod>,
}

impl Default for AccessPolicyConfig {
    /// Allow every domain, endpoint and supported method.
    fn default() -> Self {
        Self {
            allowed_domains: vec!["*".to_string()],
            blocked_domains: Vec::new(),
            allowed_endpoints: vec!["*".to_string()],
            blocked_endpoints: Vec::new(),
            allowed_methods: HttpMethod::ALL.into_iter().collect(),
        }
    }
}

/// A compiled, read-only access policy.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    allowed_domains: PatternSet,
    blocked_domains: PatternSet,
    allowed_endpoints: PatternSet,
    blocked_endpoints: PatternSet,
    allowed_methods: HashSet<HttpMethod>,
}

impl AccessPolicy {
    /// Compile a policy.
    ///
    /// # Errors
    ///
    /// Fails if any pattern is too long or cannot be compiled.
    pub fn compile(config: &AccessPolicyConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            allowed_domains: PatternSet::compile(&config.allowed_domains)?,
            blocked_domains: PatternSet::compile(&config.blocked_domains)?,
            allowed_endpoints: PatternSet::compile(&config.allowed_endpoints)?,
            blocked_endpoints: PatternSet::compile(&config.blocked_endpoints)?,
            allowed_methods: config.allowed_methods.clone(),
        })
    }

    /// A policy that admits everything.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            allowed_domains: PatternSet::any(),
            blocked_domains: PatternSet::default(),
            allowed_endpoints: PatternSet::any(),
            blocked_endpoints: PatternSet::default(),
            allowed_methods: HttpMethod::ALL.into_iter().collect(),
        }
    }

    /// Check the caller's origin domain.
    pub fn domain_allowed(&self, domain: &str) -> Result<(), Denial> {
        if self.blocked_domains.matches(domain) {
            return Err(Denial::DomainBlocked(domain.to_string()));
        }
        if !self.allowed_domains.matches(domain) {
            return Err(Denial::DomainNotAllowed(domain.to_string()));
        }
        Ok(())
    }

    /// Check the requested path.
    ///
    /// The path is tried both verbatim and normalized (leading `/` and query
    /// string removed), so `users/*` and `/users/*` behave the same.
    pub fn endpoint_allowed(&self, path: &str) -> Result<(), Denial> {
        let normalized = normalize_path(path);
        let matches = |set: &PatternSet| set.matches(normalized) || set.matches(path);

        if matches(&self.blocked_endpoints) {
            return Err(Denial::EndpointBlocked(normalized.to_string()));
        }
        if !matches(&self.allowed_endpoints) {
            return Err(Denial::EndpointNotAllowed(normalized.to_string()));
        }
        Ok(())
    }

    /// Check the HTTP verb.
    pub fn method_allowed(&self, method: &str) -> Result<(), Denial> {
        let parsed: HttpMethod = method
            .parse()
            .map_err(|_| Denial::UnsupportedMethod(method.to_string()))?;
        if !self.allowed_methods.contains(&parsed) {
            return Err(Denial::MethodNotAllowed(parsed.to_string()));
        }
        Ok(())
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

/// Strip the query string and a single leading `/`.
fn normalize_path(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    path.strip_prefix('/').unwrap_or(path)
}

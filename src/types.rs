//! Core types shared by admission and routing.

use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

use crate::policy::AccessPolicy;

/// Per-resource request quotas. A value of `0` disables that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageLimits {
    pub requests_per_second: u32,
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    pub requests_per_month: u32,
}

impl UsageLimits {
    /// Limits with every window disabled.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            requests_per_second: 0,
            requests_per_minute: 0,
            requests_per_day: 0,
            requests_per_month: 0,
        }
    }
}

/// The HTTP verbs a proxied resource may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALL: [Self; 5] = [Self::Get, Self::Post, Self::Put, Self::Delete, Self::Patch];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a verb is not one of the five supported methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedMethod(s.to_string()))
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
            HttpMethod::Patch => Self::PATCH,
        }
    }
}

/// Endpoints serving one logical backend, such as a chain id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    /// Operator-run endpoint, preferred while healthy.
    pub self_hosted: Option<String>,
    /// Primary followed by fallbacks, in priority order.
    pub configured: Vec<String>,
}

impl EndpointSet {
    /// Returns `true` if neither a self-hosted nor a configured endpoint exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.self_hosted.is_none() && self.configured.is_empty()
    }
}

/// A proxied resource as supplied by the resource store.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    /// Inactive resources reject all traffic.
    pub active: bool,
    /// Logical backend the resource forwards to.
    pub backend_id: String,
    pub policy: AccessPolicy,
    pub limits: UsageLimits,
}

/// A request to forward to a backend endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path appended to the endpoint URL. Empty for JSON-RPC relays.
    pub path: String,
    /// JSON body, sent as `application/json`.
    pub body: Option<serde_json::Value>,
}

impl ProxyRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    /// A JSON-RPC call, posted directly to the endpoint URL.
    #[must_use]
    pub fn json_rpc(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: String::new(),
            body: Some(body),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Join this request's path onto an endpoint base URL.
    pub(crate) fn url_for(&self, endpoint: &str) -> String {
        if self.path.is_empty() {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// A successful response from a backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

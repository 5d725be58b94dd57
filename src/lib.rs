//! Admission control and failover routing for proxied backends.
//!
//! This crate decides, for every request against a proxied backend, whether
//! it is admitted and where it goes:
//!
//! - **[`AdmissionPipeline`]** checks the resource's [`AccessPolicy`]
//!   (origin domain, endpoint, method) and its [`UsageLimits`] over four fixed
//!   windows (second, minute, day, month), tracked in a bounded
//!   [`RateLimitStore`].
//! - **[`FailoverRouter`]** sends the request to the endpoints of a logical
//!   backend in priority order, skipping endpoints the
//!   [`EndpointHealthTracker`] considers unhealthy.
//! - **[`Gateway`]** runs both in sequence.
//!
//! # Access Policies
//!
//! Policies use glob patterns: `*` matches within one path segment, `**`
//! across segments, `?` a single character. Block lists override allow
//! lists, and endpoint patterns work with or without a leading `/`.
//!
//! ```rust
//! use gateway_admission::{AccessPolicy, AccessPolicyConfig};
//!
//! let policy = AccessPolicy::compile(&AccessPolicyConfig {
//!     allowed_endpoints: vec!["users/*".into()],
//!     blocked_endpoints: vec!["users/admin".into()],
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! assert!(policy.endpoint_allowed("/users/42").is_ok());
//! assert!(policy.endpoint_allowed("users/admin").is_err());
//! ```
//!
//! # Failover
//!
//! A healthy self-hosted endpoint is tried first, then the configured
//! endpoints in order. Three failures within five minutes take an endpoint out
//! of rotation for sixty seconds; any success puts it back immediately.
//!
//! ```rust,no_run
//! use gateway_admission::{FailoverRouter, ProxyRequest};
//! use serde_json::json;
//!
//! # async fn example() {
//! let router = FailoverRouter::builder()
//!     .backend("1", |b| {
//!         b.self_hosted("http://geth.internal:8545")
//!             .endpoint("https://eth.llamarpc.com")
//!             .endpoint("https://rpc.ankr.com/eth")
//!     })
//!     .build();
//!
//! let result = router
//!     .proxy("1", &ProxyRequest::json_rpc(json!({
//!         "jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber", "params": []
//!     })))
//!     .await
//!     .unwrap();
//! println!("served by {} in {}ms", result.endpoint_used, result.latency_ms);
//! # }
//! ```
//!
//! # Memory
//!
//! Usage state is kept per `subject:resource` key, capped at
//! [`MAX_ENTRIES`] keys with least-recently-used eviction. Call
//! [`RateLimitStore::spawn_sweeper`] to drop keys idle for a day.

mod admission;
mod builder;
mod error;
mod gateway;
mod health;
mod middleware;
mod pattern;
mod policy;
mod router;
mod store;
mod transport;
mod types;
mod window;

// Public re-exports
pub use admission::{
    AccessCheckResult, AccessRequest, AdmissionPipeline, InMemoryResources, ResourceStore,
    usage_key,
};
pub use builder::{BackendBuilder, RouterBuilder};
pub use error::{AccessScope, Denial, GatewayError};
pub use gateway::Gateway;
pub use health::{
    EndpointHealthSnapshot, EndpointHealthTracker, FAILURE_THRESHOLD, HEALTH_WINDOW,
    HealthConfig, RECOVERY_WINDOW,
};
pub use middleware::{AdmissionContext, AdmissionMiddleware};
pub use pattern::{MAX_PATTERN_LEN, Matcher, PatternSet, compile, matches_any};
pub use policy::{AccessPolicy, AccessPolicyConfig};
pub use router::{
    Candidate, DEFAULT_TIMEOUT, EndpointRegistry, FailoverRouter, MAX_BATCH_SIZE, ProxyResult,
};
pub use store::{
    MAX_ENTRIES, RateLimitConfig, RateLimitStore, STALE_THRESHOLD, SWEEP_INTERVAL, Usage,
};
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{
    EndpointSet, HttpMethod, ProxyRequest, ProxyResponse, Resource, UnsupportedMethod, UsageLimits,
};
pub use window::Window;

//! Endpoint health tracking.
//!
//! Each backend URL is either healthy or unhealthy. Failures are counted
//! inside a rolling window; reaching the threshold marks the endpoint
//! unhealthy. Recovery is evaluated lazily on read: once the recovery window
//! has passed since the last failure, the endpoint is put back on probation as
//! healthy. Any success restores it immediately.
//!
//! There are no timers. Endpoints that never fail never allocate.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Failures needed to mark an endpoint unhealthy.
pub const FAILURE_THRESHOLD: u32 = 3;
/// Failures older than this no longer count toward the threshold.
pub const HEALTH_WINDOW: Duration = Duration::from_secs(5 * 60);
/// How long an unhealthy endpoint is skipped after its last failure.
pub const RECOVERY_WINDOW: Duration = Duration::from_secs(60);

/// Thresholds for the health state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    pub failure_threshold: u32,
    pub health_window: Duration,
    pub recovery_window: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: FAILURE_THRESHOLD,
            health_window: HEALTH_WINDOW,
            recovery_window: RECOVERY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct EndpointHealth {
    failure_count: u32,
    last_failure_at: Instant,
    healthy: bool,
}

/// Diagnostic view of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointHealthSnapshot {
    pub healthy: bool,
    pub failure_count: u32,
}

/// Tracks health for every endpoint the router has tried.
///
/// Shared by reference between routers; all methods take `&self`.
#[derive(Debug, Default)]
pub struct EndpointHealthTracker {
    config: HealthConfig,
    endpoints: DashMap<String, EndpointHealth>,
}

impl EndpointHealthTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: HealthConfig) -> Self {
        Self {
            config,
            endpoints: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> HealthConfig {
        self.config
    }

    /// Returns `true` unless the endpoint is unhealthy and still inside its
    /// recovery window.
    pub fn is_healthy(&self, endpoint: &str) -> bool {
        let Some(mut entry) = self.endpoints.get_mut(endpoint) else {
            return true;
        };
        if entry.healthy {
            return true;
        }

        if entry.last_failure_at.elapsed() > self.config.recovery_window {
            entry.healthy = true;
            entry.failure_count = 0;
            #[cfg(feature = "tracing")]
            tracing::info!(endpoint, "endpoint back on probation after recovery window");
            return true;
        }
        false
    }

    pub fn record_failure(&self, endpoint: &str) {
        let now = Instant::now();
        let mut entry = self
            .endpoints
            .entry(endpoint.to_string())
            .or_insert(EndpointHealth {
                failure_count: 0,
                last_failure_at: now,
                healthy: true,
            });

        if now.saturating_duration_since(entry.last_failure_at) > self.config.health_window {
            entry.failure_count = 0;
        }
        entry.failure_count = entry.failure_count.saturating_add(1);
        entry.last_failure_at = now;

        if entry.failure_count >= self.config.failure_threshold && entry.healthy {
            entry.healthy = false;
            #[cfg(feature = "tracing")]
            tracing::warn!(
                endpoint,
                failures = entry.failure_count,
                "endpoint marked unhealthy"
            );
        }
    }

    pub fn record_success(&self, endpoint: &str) {
        if let Some(mut entry) = self.endpoints.get_mut(endpoint) {
            #[cfg(feature = "tracing")]
            if !entry.healthy {
                tracing::info!(endpoint, "endpoint recovered");
            }
            entry.failure_count = 0;
            entry.healthy = true;
        }
    }

    /// Health of every endpoint that has ever failed.
    ///
    /// An unhealthy endpoint past its recovery window is reported healthy
    /// with no failures, as [`is_healthy`](Self::is_healthy) would find it.
    /// The stored state is left untouched.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, EndpointHealthSnapshot> {
        self.endpoints
            .iter()
            .map(|entry| {
                let recovered = !entry.healthy
                    && entry.last_failure_at.elapsed() > self.config.recovery_window;
                let snapshot = if recovered {
                    EndpointHealthSnapshot {
                        healthy: true,
                        failure_count: 0,
                    }
                } else {
                    EndpointHealthSnapshot {
                        healthy: entry.healthy,
                        failure_count: entry.failure_count,
                    }
                };
                (entry.key().clone(), snapshot)
            })
            .collect()
    }
}

//! Bounded per-subject usage store.

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::Denial;
use crate::types::UsageLimits;
use crate::window::{RateLimitState, Window, ceil_secs};

/// Maximum number of subject keys tracked at once.
pub const MAX_ENTRIES: usize = 100_000;
/// Keys idle for longer than this are removed by the sweep.
pub const STALE_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);
/// How often the background sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Capacity and idle-eviction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_entries: usize,
    pub stale_threshold: Duration,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_entries: MAX_ENTRIES,
            stale_threshold: STALE_THRESHOLD,
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

/// Current counts for one key, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub second: u32,
    pub minute: u32,
    pub day: u32,
    pub month: u32,
}

/// Tracks second, minute, day and month usage per subject key.
///
/// # Thread Safety
///
/// Every operation on a key runs under that key's [`DashMap`] entry lock, so
/// [`check_and_increment`](Self::check_and_increment) is atomic per key.
/// Inserting a new key at capacity is serialized by a separate lock so the
/// store never holds more than `max_entries` keys.
#[derive(Debug)]
pub struct RateLimitStore {
    config: RateLimitConfig,
    entries: DashMap<String, RateLimitState>,
    insert_lock: Mutex<()>,
}

impl Default for RateLimitStore {
    fn default() -> Self {
        Self::with_config(RateLimitConfig::default())
    }
}

impl RateLimitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            insert_lock: Mutex::new(()),
        }
    }

    /// A store holding at most `max_entries` keys, with default timings.
    #[must_use]
    pub fn with_capacity(max_entries: usize) -> Self {
        Self::with_config(RateLimitConfig {
            max_entries,
            ..RateLimitConfig::default()
        })
    }

    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Check `key` against `limits` without counting the request.
    ///
    /// Windows are checked from finest to coarsest and the first exhausted one
    /// is reported.
    pub fn check_limit(&self, key: &str, limits: &UsageLimits) -> Result<(), Denial> {
        let now = Instant::now();
        let state = self.state(key, now);
        Self::evaluate(&state, limits, now)
    }

    /// Count one request against every window of `key`.
    pub fn increment(&self, key: &str) {
        let now = Instant::now();
        self.state(key, now).increment();
    }

    /// Check and, if allowed, count the request while holding the key's lock.
    pub fn check_and_increment(&self, key: &str, limits: &UsageLimits) -> Result<(), Denial> {
        let now = Instant::now();
        let mut state = self.state(key, now);
        Self::evaluate(&state, limits, now)?;
        state.increment();
        Ok(())
    }

    /// Current counts for `key`, or `None` if it is not tracked.
    ///
    /// Does not refresh the key's access time.
    #[must_use]
    pub fn usage(&self, key: &str) -> Option<Usage> {
        let now = Instant::now();
        let state = self.entries.get(key)?;
        let count = |window: Window| {
            let counter = state.counter(window);
            if now >= counter.reset_at { 0 } else { counter.count }
        };
        Some(Usage {
            second: count(Window::Second),
            minute: count(Window::Minute),
            day: count(Window::Day),
            month: count(Window::Month),
        })
    }

    /// Remove keys idle for longer than the stale threshold.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let threshold = self.config.stale_threshold;
        self.entries
            .retain(|_, state| state.last_access_at.elapsed() <= threshold);
        let removed = before.saturating_sub(self.entries.len());

        #[cfg(feature = "tracing")]
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "swept idle rate limit keys");
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.sweep();
            }
        })
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evaluate(state: &RateLimitState, limits: &UsageLimits, now: Instant) -> Result<(), Denial> {
        match state.exhausted(limits, now) {
            None => Ok(()),
            Some((window, wait)) => Err(Denial::RateLimited {
                window,
                retry_after_secs: ceil_secs(wait),
            }),
        }
    }

    /// Fetch or create the state for `key`, refreshed to `now`.
    fn state(&self, key: &str, now: Instant) -> RefMut<'_, String, RateLimitState> {
        if let Some(mut state) = self.entries.get_mut(key) {
            state.touch(now);
            return state;
        }

        let _guard = self
            .insert_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !self.entries.contains_key(key) {
            while self.entries.len() >= self.config.max_entries.max(1) {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        let mut state = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitState::new(now));
        state.touch(now);
        state
    }

    /// Remove the key with the oldest access time.
    fn evict_oldest(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_access_at)
            .map(|entry| entry.key().clone());

        let Some(key) = oldest else {
            return false;
        };
        self.entries.remove(&key);

        #[cfg(feature = "tracing")]
        tracing::debug!(evicted = %key, "rate limit store at capacity, evicted oldest key");
        true
    }
}

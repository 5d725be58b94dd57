//! Fixed-window usage counters.
//!
//! Each subject key tracks four independent windows. A window counts requests
//! until its reset instant, then starts over from zero. Resets are applied
//! lazily whenever the window is read, so idle keys cost nothing.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::UsageLimits;

/// One of the four usage windows, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Second,
    Minute,
    Day,
    Month,
}

impl Window {
    /// All windows in evaluation order.
    pub const ALL: [Self; 4] = [Self::Second, Self::Minute, Self::Day, Self::Month];

    /// Length of the window. A month is fixed at 30 days.
    #[must_use]
    pub const fn duration(self) -> Duration {
        match self {
            Self::Second => Duration::from_secs(1),
            Self::Minute => Duration::from_secs(60),
            Self::Day => Duration::from_secs(24 * 60 * 60),
            Self::Month => Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// The configured limit for this window. Zero means unlimited.
    #[inline]
    pub(crate) const fn limit(self, limits: &UsageLimits) -> u32 {
        match self {
            Self::Second => limits.requests_per_second,
            Self::Minute => limits.requests_per_minute,
            Self::Day => limits.requests_per_day,
            Self::Month => limits.requests_per_month,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Second => 0,
            Self::Minute => 1,
            Self::Day => 2,
            Self::Month => 3,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Day => "day",
            Self::Month => "month",
        })
    }
}

/// A single fixed window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WindowCounter {
    pub count: u32,
    pub reset_at: Instant,
}

impl WindowCounter {
    fn fresh(window: Window, now: Instant) -> Self {
        Self {
            count: 0,
            reset_at: now + window.duration(),
        }
    }
}

/// Usage state for one subject key.
#[derive(Debug, Clone)]
pub(crate) struct RateLimitState {
    windows: [WindowCounter; 4],
    pub last_access_at: Instant,
}

impl RateLimitState {
    pub fn new(now: Instant) -> Self {
        Self {
            windows: Window::ALL.map(|w| WindowCounter::fresh(w, now)),
            last_access_at: now,
        }
    }

    /// Mark the state as accessed and reset every stale window.
    pub fn touch(&mut self, now: Instant) {
        self.last_access_at = now;
        for window in Window::ALL {
            let counter = &mut self.windows[window.index()];
            if now >= counter.reset_at {
                *counter = WindowCounter::fresh(window, now);
            }
        }
    }

    pub fn counter(&self, window: Window) -> WindowCounter {
        self.windows[window.index()]
    }

    /// Check every window from finest to coarsest. Returns the first exhausted
    /// window and how long until it resets.
    ///
    /// Callers must [`touch`](Self::touch) first so stale windows read as empty.
    pub fn exhausted(&self, limits: &UsageLimits, now: Instant) -> Option<(Window, Duration)> {
        Window::ALL.into_iter().find_map(|window| {
            let limit = window.limit(limits);
            let counter = self.counter(window);
            (limit > 0 && counter.count >= limit)
                .then(|| (window, counter.reset_at.saturating_duration_since(now)))
        })
    }

    pub fn increment(&mut self) {
        for counter in &mut self.windows {
            counter.count = counter.count.saturating_add(1);
        }
    }
}

/// Round a wait up to whole seconds.
#[inline]
pub(crate) fn ceil_secs(wait: Duration) -> u64 {
    let millis = wait.as_millis();
    u64::try_from(millis.div_ceil(1000)).unwrap_or(u64::MAX)
}

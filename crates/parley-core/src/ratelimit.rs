//! Fixed-window rate limiting for Parley.
//!
//! Admission control for message ingestion. The counter resets at fixed
//! window boundaries, so a burst straddling a boundary can admit up to twice
//! `max_requests` in a short span; that approximation is accepted for this
//! use case.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Requests admitted per identifier per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Per-identifier window state.
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request counter keyed by identifier.
///
/// Constructed at startup and injected into the service; never ambient
/// state. Entries live for the process lifetime: an expired window is reset
/// in place on its next check, not collected.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Create a limiter with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RateLimiterConfig::default())
    }

    /// Create a limiter with custom configuration.
    #[must_use]
    pub fn with_config(config: RateLimiterConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    /// Check whether a request from `identifier` is admitted now.
    pub fn check(&self, identifier: &str) -> bool {
        self.check_at(identifier, Instant::now())
    }

    /// Check admission at an explicit instant.
    ///
    /// The whole check-and-increment is atomic per identifier: the map entry
    /// stays locked for the duration, so concurrent callers for the same
    /// identifier serialize.
    pub fn check_at(&self, identifier: &str, now: Instant) -> bool {
        let mut entry = self
            .windows
            .entry(identifier.to_string())
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + self.config.window,
            });

        let window = entry.value_mut();

        if now > window.reset_at {
            window.count = 1;
            window.reset_at = now + self.config.window;
            return true;
        }

        if window.count >= self.config.max_requests {
            debug!(identifier = %identifier, "Rate limit exceeded");
            return false;
        }

        window.count += 1;
        true
    }

    /// Number of identifiers currently tracked.
    #[must_use]
    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

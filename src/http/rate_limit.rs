//! Client-side request throttling
//!
//! A token bucket (governor) shared by every request a client makes, so the
//! connector stays under Branch's per-app quota instead of relying on 429s.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Configuration for request throttling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Sustained requests per minute
    pub requests_per_minute: u32,
    /// Requests allowed back to back before throttling kicks in
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 300,
            burst_size: 10,
        }
    }
}

impl RateLimiterConfig {
    /// Create a new throttling config
    pub fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size,
        }
    }
}

/// Token bucket rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter; zero values are raised to one
    pub fn new(config: &RateLimiterConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(Governor::direct(Quota::per_minute(rate).allow_burst(burst))),
        }
    }

    /// Wait until a request may be sent
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

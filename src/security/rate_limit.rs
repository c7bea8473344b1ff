//! Per-client token bucket rate limiting.
//!
//! Clients are keyed by peer IP. When the server runs without connection
//! info (in-process tests), all requests share one bucket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitConfig;
use crate::http::response::ApiError;
use crate::observability::metrics;

/// Tracked clients before full buckets are swept out.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    /// A bucket that has refilled completely carries no state worth keeping.
    fn is_full(&self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * refill_rate >= capacity
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiterState {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    rps: f64,
    burst: f64,
    max_clients: usize,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rps: f64::from(config.requests_per_second),
            burst: f64::from(config.burst_size.max(1)),
            max_clients: MAX_TRACKED_CLIENTS,
        }
    }

    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if buckets.len() >= self.max_clients && !buckets.contains_key(key) {
            let before = buckets.len();
            buckets.retain(|_, bucket| !bucket.is_full(self.burst, self.rps, now));
            tracing::debug!(evicted = before - buckets.len(), "Swept idle rate limit buckets");
        }
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst, now));

        bucket.try_acquire(self.burst, self.rps, now)
    }
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "local".to_string());

    if state.check(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        ApiError::rate_limited().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(rps: u32, burst: u32) -> RateLimiterState {
        RateLimiterState::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: rps,
            burst_size: burst,
        })
    }

    #[test]
    fn test_burst_then_reject() {
        let state = limiter(1, 3);
        let now = Instant::now();
        assert!(state.check_at("a", now));
        assert!(state.check_at("a", now));
        assert!(state.check_at("a", now));
        assert!(!state.check_at("a", now));
        // Separate clients have separate buckets.
        assert!(state.check_at("b", now));
    }

    #[test]
    fn test_refill_over_time() {
        let state = limiter(2, 1);
        let now = Instant::now();
        assert!(state.check_at("a", now));
        assert!(!state.check_at("a", now));
        assert!(state.check_at("a", now + Duration::from_millis(600)));
    }

    #[test]
    fn test_idle_clients_evicted_at_capacity() {
        let mut state = limiter(1, 2);
        state.max_clients = 3;
        let now = Instant::now();
        for client in ["a", "b", "c"] {
            assert!(state.check_at(client, now));
        }
        // "c" is still draining when the sweep runs.
        assert!(state.check_at("c", now + Duration::from_millis(1500)));

        let later = now + Duration::from_secs(2);
        assert!(state.check_at("d", later));
        let tracked: Vec<_> = {
            let buckets = state.buckets.lock().unwrap();
            let mut keys: Vec<_> = buckets.keys().cloned().collect();
            keys.sort();
            keys
        };
        assert_eq!(tracked, vec!["c", "d"]);
    }
}

//! Per-client rate limiter.

use super::bucket::TokenBucket;
use super::config::{RateLimitAlgorithm, RateLimitConfig};
use super::error::{RateLimitError, RateLimitResult};
use super::window::SlidingWindow;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Decision from a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is allowed.
    pub allowed: bool,

    /// Requests left in the current window.
    pub remaining: u32,

    /// Maximum requests per window.
    pub limit: u32,

    /// Time until the limit resets.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Get retry-after in seconds (for HTTP header).
    #[inline]
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_after.as_secs().max(1)
    }
}

/// Read-only view of a client's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    /// Maximum requests per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Whole seconds until the limit resets.
    pub reset_in_seconds: u64,
}

#[derive(Debug)]
enum ClientState {
    Bucket(TokenBucket),
    Window(SlidingWindow),
}

impl ClientState {
    fn new(config: &RateLimitConfig, now: Instant) -> Self {
        match config.algorithm {
            RateLimitAlgorithm::TokenBucket => {
                Self::Bucket(TokenBucket::new_at(config.max_requests, config.window, now))
            },
            RateLimitAlgorithm::SlidingWindow => {
                Self::Window(SlidingWindow::new(config.max_requests, config.window))
            },
        }
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        match self {
            Self::Bucket(bucket) => bucket.try_consume(now),
            Self::Window(window) => window.try_acquire(now),
        }
    }

    fn remaining(&mut self, now: Instant) -> u32 {
        match self {
            Self::Bucket(bucket) => bucket.remaining(now),
            Self::Window(window) => window.remaining(now),
        }
    }

    fn reset_after(&self, now: Instant) -> Duration {
        match self {
            Self::Bucket(bucket) => bucket.reset_after(now),
            Self::Window(window) => window.reset_after(now),
        }
    }
}

/// Rate limiter keyed by client identifier.
///
/// Each client has its own mutex, so checks for different clients never
/// contend and checks for one client are linearizable.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: DashMap<String, Arc<Mutex<ClientState>>>,

    total_checks: AtomicU64,
    total_allowed: AtomicU64,
    total_denied: AtomicU64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("clients", &self.clients.len())
            .field("total_checks", &self.total_checks)
            .field("total_allowed", &self.total_allowed)
            .field("total_denied", &self.total_denied)
            .finish()
    }
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_requests` or `window` is zero.
    pub fn new(config: RateLimitConfig) -> RateLimitResult<Self> {
        if config.max_requests == 0 {
            return Err(RateLimitError::InvalidConfig(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if config.window.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "window must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            config,
            clients: DashMap::new(),
            total_checks: AtomicU64::new(0),
            total_allowed: AtomicU64::new(0),
            total_denied: AtomicU64::new(0),
        })
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether the client may make a request, consuming quota if so.
    pub fn check(&self, client_id: &str) -> RateLimitDecision {
        let now = Instant::now();
        let state = self.client(client_id, now);
        let mut state = state.lock().expect("rate limit lock poisoned");

        let allowed = state.try_acquire(now);
        let decision = RateLimitDecision {
            allowed,
            remaining: state.remaining(now),
            limit: self.config.max_requests,
            reset_after: state.reset_after(now),
        };
        drop(state);

        self.total_checks.fetch_add(1, Ordering::Relaxed);
        if allowed {
            self.total_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_denied.fetch_add(1, Ordering::Relaxed);
            debug!(client = %client_id, "Rate limit exceeded");
        }

        decision
    }

    /// Shorthand for `check(client_id).allowed`.
    pub fn allow_request(&self, client_id: &str) -> bool {
        self.check(client_id).allowed
    }

    /// Report a client's quota without consuming any.
    ///
    /// A client never seen before reports a full quota.
    #[must_use]
    pub fn rate_limit_info(&self, client_id: &str) -> RateLimitInfo {
        let limit = self.config.max_requests;
        let Some(state) = self.clients.get(client_id).map(|s| Arc::clone(s.value())) else {
            return RateLimitInfo {
                limit,
                remaining: limit,
                reset_in_seconds: 0,
            };
        };

        let now = Instant::now();
        let mut state = state.lock().expect("rate limit lock poisoned");
        RateLimitInfo {
            limit,
            remaining: state.remaining(now),
            reset_in_seconds: state.reset_after(now).as_secs(),
        }
    }

    /// Number of clients with state.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Get (checks, allowed, denied) totals.
    #[must_use]
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.total_checks.load(Ordering::Relaxed),
            self.total_allowed.load(Ordering::Relaxed),
            self.total_denied.load(Ordering::Relaxed),
        )
    }

    fn client(&self, client_id: &str, now: Instant) -> Arc<Mutex<ClientState>> {
        if let Some(state) = self.clients.get(client_id) {
            return Arc::clone(state.value());
        }
        Arc::clone(
            self.clients
                .entry(client_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ClientState::new(&self.config, now))))
                .value(),
        )
    }
}

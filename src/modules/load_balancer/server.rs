//! Backend server entity and its live counters.

use super::config::UpstreamConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

/// Request counters for a single server.
///
/// Every field is updated atomically so the pipeline and the health checker
/// can touch the same server concurrently without tearing.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Requests currently in flight (tracked by connection-aware strategies).
    pub active_connections: AtomicU64,
    /// Requests forwarded to this server.
    pub total_requests: AtomicU64,
    /// Forwarded requests that failed.
    pub failed_requests: AtomicU64,
    /// Health probes that ended unhealthy.
    pub failed_health_checks: AtomicU64,
    /// Moving response time in milliseconds, stored as `f64` bits.
    average_response_time: AtomicU64,
}

impl ServerStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current active connection count.
    #[must_use]
    pub fn active_connection_count(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get total forwarded request count.
    #[must_use]
    pub fn total_request_count(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Get failed request count.
    #[must_use]
    pub fn failed_request_count(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    /// Get failed health check count.
    #[must_use]
    pub fn failed_health_check_count(&self) -> u64 {
        self.failed_health_checks.load(Ordering::Relaxed)
    }

    /// Get the moving average response time in milliseconds.
    #[must_use]
    pub fn average_response_time(&self) -> f64 {
        f64::from_bits(self.average_response_time.load(Ordering::Relaxed))
    }
}

/// A backend endpoint. Identity is its URL.
#[derive(Debug)]
pub struct Server {
    url: String,
    weight: u32,
    max_connections: u64,
    healthy: AtomicBool,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
    stats: ServerStats,
}

impl Server {
    /// Create a healthy server with no traffic recorded.
    #[must_use]
    pub fn new(url: impl Into<String>, weight: u32, max_connections: u64) -> Self {
        Self {
            url: url.into(),
            weight,
            max_connections,
            healthy: AtomicBool::new(true),
            last_health_check: RwLock::new(None),
            stats: ServerStats::new(),
        }
    }

    /// Create a server from upstream configuration.
    #[must_use]
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(config.url.clone(), config.weight, config.max_connections)
    }

    /// Get the server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the configured weight.
    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Get the connection ceiling.
    #[must_use]
    pub fn max_connections(&self) -> u64 {
        self.max_connections
    }

    /// Get the request counters.
    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Whether the last health probe succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Flip the health flag, returning the previous value.
    ///
    /// Only the health checker calls this in a running balancer.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::AcqRel)
    }

    /// Whether the active connection count reached the ceiling.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.stats.active_connection_count() >= self.max_connections
    }

    /// Healthy and below the connection ceiling.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.is_healthy() && !self.is_at_capacity()
    }

    /// Time of the last completed health probe.
    #[must_use]
    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self
            .last_health_check
            .read()
            .expect("last_health_check lock poisoned")
    }

    /// Stamp the last health probe time with now.
    pub fn mark_health_checked(&self) {
        let mut last = self
            .last_health_check
            .write()
            .expect("last_health_check lock poisoned");
        *last = Some(Utc::now());
    }

    /// A request started on this server.
    pub fn increment_connections(&self) {
        self.stats.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A request finished on this server. Never drops below zero.
    pub fn decrement_connections(&self) {
        let _ = self.stats.active_connections.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| current.checked_sub(1),
        );
    }

    /// A request was forwarded to this server.
    pub fn record_request(&self) {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// A forwarded request failed.
    pub fn record_failure(&self) {
        self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// A health probe ended unhealthy.
    pub fn record_health_failure(&self) {
        self.stats
            .failed_health_checks
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a response time sample into the moving average: `(avg + sample) / 2`.
    pub fn update_response_time(&self, sample_ms: f64) {
        let _ = self.stats.average_response_time.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |bits| Some(((f64::from_bits(bits) + sample_ms) / 2.0).to_bits()),
        );
    }

    /// Percentage of forwarded requests that succeeded; 100 with no traffic.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.stats.total_request_count();
        if total == 0 {
            return 100.0;
        }
        let failed = self.stats.failed_request_count().min(total);
        (total - failed) as f64 / total as f64 * 100.0
    }

    /// Point-in-time view for admin and metrics surfaces.
    #[must_use]
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            url: self.url.clone(),
            weight: self.weight,
            max_connections: self.max_connections,
            healthy: self.is_healthy(),
            active_connections: self.stats.active_connection_count(),
            total_requests: self.stats.total_request_count(),
            failed_requests: self.stats.failed_request_count(),
            failed_health_checks: self.stats.failed_health_check_count(),
            average_response_time_ms: self.stats.average_response_time(),
            success_rate: self.success_rate(),
            last_health_check: self.last_health_check(),
        }
    }
}

/// Serializable snapshot of a [`Server`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSnapshot {
    /// Server URL.
    pub url: String,
    /// Configured weight.
    pub weight: u32,
    /// Connection ceiling.
    pub max_connections: u64,
    /// Health flag.
    pub healthy: bool,
    /// In-flight requests.
    pub active_connections: u64,
    /// Forwarded requests.
    pub total_requests: u64,
    /// Failed forwarded requests.
    pub failed_requests: u64,
    /// Failed health probes.
    pub failed_health_checks: u64,
    /// Moving average response time.
    pub average_response_time_ms: f64,
    /// Success percentage.
    pub success_rate: f64,
    /// Last probe time.
    pub last_health_check: Option<DateTime<Utc>>,
}

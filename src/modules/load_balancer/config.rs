//! Load balancer configuration types.

use crate::modules::circuit_breaker::CircuitBreakerConfig;
use crate::modules::rate_limiting::RateLimitConfig;
use crate::modules::sticky_session::StickySessionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Global load balancing settings shared by every service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Default selection algorithm (services may override it).
    pub algorithm: Algorithm,

    /// Active health checking.
    pub health_check: HealthCheckConfig,

    /// Per-server circuit breaking.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Cookie-based session affinity.
    pub sticky_session: StickySessionConfig,
}

/// A named service and the upstreams its traffic is spread over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name; also the first path segment of routed requests.
    pub name: String,

    /// Algorithm override for this service.
    #[serde(default)]
    pub algorithm: Option<Algorithm>,

    /// Upstreams serving the service (the blue side when blue-green is used).
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,

    /// Newly deployed upstreams; enables blue-green shifting for the service.
    #[serde(default)]
    pub green_upstreams: Vec<UpstreamConfig>,
}

impl ServiceConfig {
    /// The algorithm this service runs, falling back to the global default.
    #[must_use]
    pub fn effective_algorithm(&self, default: Algorithm) -> Algorithm {
        self.algorithm.unwrap_or(default)
    }

    /// Whether the service takes part in blue-green deployments.
    #[must_use]
    pub fn has_green(&self) -> bool {
        !self.green_upstreams.is_empty()
    }
}

/// A single backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `http://10.0.0.1:8080`.
    pub url: String,

    /// Weight for weighted round robin.
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Connection ceiling before the server counts as at capacity.
    #[serde(default = "default_max_connections")]
    pub max_connections: u64,
}

impl UpstreamConfig {
    /// Upstream with default weight and connection ceiling.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            weight: default_weight(),
            max_connections: default_max_connections(),
        }
    }
}

/// Server selection algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Rotate through servers.
    #[default]
    RoundRobin,
    /// Fewest active connections.
    LeastConnections,
    /// Hash of the client IP.
    IpHash,
    /// Round robin over a weight-expanded pool.
    WeightedRoundRobin,
    /// Uniformly random healthy server.
    Random,
}

impl Algorithm {
    /// Every algorithm, in declaration order.
    pub const ALL: [Algorithm; 5] = [
        Algorithm::RoundRobin,
        Algorithm::LeastConnections,
        Algorithm::IpHash,
        Algorithm::WeightedRoundRobin,
        Algorithm::Random,
    ];

    /// Kebab-case name, as used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round-robin",
            Self::LeastConnections => "least-connections",
            Self::IpHash => "ip-hash",
            Self::WeightedRoundRobin => "weighted-round-robin",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable health checks. When disabled every server stays healthy.
    pub enabled: bool,

    /// Probe interval.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Timeout of a single probe attempt.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Path probed on every server.
    pub path: String,

    /// Attempts per probe before the server is declared unhealthy.
    pub max_retries: u32,

    /// Base delay between attempts; attempt `k` waits `k * retry_backoff`.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
            path: "/actuator/health".to_string(),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_max_connections() -> u64 {
    100
}

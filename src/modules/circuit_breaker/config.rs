//! Circuit breaker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Gate forwarding on circuit state.
    pub enabled: bool,

    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,

    /// How long a circuit stays open before allowing a trial request.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Quiet period after which stale failures are forgotten.
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(300),
        }
    }
}

//! Rate limiting configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Admission algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitAlgorithm {
    /// Bucket refilled in full once per window.
    #[default]
    TokenBucket,
    /// Trailing window of request timestamps.
    SlidingWindow,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Apply rate limiting.
    pub enabled: bool,

    /// Requests allowed per window and client.
    pub max_requests: u32,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Admission algorithm.
    pub algorithm: RateLimitAlgorithm,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 100,
            window: Duration::from_secs(60),
            algorithm: RateLimitAlgorithm::TokenBucket,
        }
    }
}

//! Sticky session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sticky session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StickySessionConfig {
    /// Bind sessions to servers.
    pub enabled: bool,

    /// Idle time after which a binding expires.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Name of the session cookie.
    pub cookie_name: String,

    /// Period of the expiry sweep.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for StickySessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_secs(30 * 60),
            cookie_name: "LB_SESSION_ID".to_string(),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

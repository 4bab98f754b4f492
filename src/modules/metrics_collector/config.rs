//! Metrics configuration.

use serde::{Deserialize, Serialize};

/// Metrics exposition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve metrics on the listener.
    pub enabled: bool,

    /// Path of the text exposition endpoint.
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

//! Configuration type definitions.

use crate::modules::load_balancer::{LoadBalancerConfig, ServiceConfig};
use crate::modules::metrics_collector::MetricsConfig;
use crate::modules::proxy::{AdminConfig, ListenerConfig, ProxyConfig};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Inbound listener.
    pub listener: ListenerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Metrics exposition.
    pub metrics: MetricsConfig,

    /// Admin API.
    pub admin: AdminConfig,

    /// Forwarding behaviour.
    pub proxy: ProxyConfig,

    /// Balancing, health, circuit, rate limit and session settings.
    pub load_balancer: LoadBalancerConfig,

    /// Routed services.
    pub services: Vec<ServiceConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: LogLevel,

    /// Log format (json, pretty, compact).
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level (default).
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level (least verbose).
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable).
    Json,
    /// Pretty format with colors (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
}

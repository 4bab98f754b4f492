//! Listener, proxy and admin configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Inbound listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_address: String,

    /// Port to listen on.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ListenerConfig {
    /// Socket address to bind, if the address parses.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port).parse().ok()
    }
}

/// Forwarding behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Bound on a whole backend exchange.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Subpath forwarded without stripping the service segment.
    pub introspection_prefix: String,

    /// Record relayed 5xx responses as failures.
    pub count_server_errors_as_failures: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            introspection_prefix: "/actuator".to_string(),
            count_server_errors_as_failures: false,
        }
    }
}

/// Administrative API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin API on the listener.
    pub enabled: bool,

    /// Path prefix of the admin routes.
    pub path_prefix: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_prefix: "/admin".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_socket_addr() {
        let listener = ListenerConfig::default();
        assert_eq!(listener.socket_addr().unwrap().port(), 8080);

        let bad = ListenerConfig {
            bind_address: "not an address".to_string(),
            port: 80,
        };
        assert!(bad.socket_addr().is_none());
    }

    #[test]
    fn test_proxy_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.introspection_prefix, "/actuator");
        assert!(!config.count_server_errors_as_failures);
    }
}

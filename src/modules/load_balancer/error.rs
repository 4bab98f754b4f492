//! Load balancer error types.

use thiserror::Error;

/// Errors that can occur while resolving a service to a backend server.
#[derive(Debug, Error)]
pub enum LoadBalancerError {
    /// The service name is not configured.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The candidate pool was empty.
    #[error("no available servers")]
    NoAvailableServers,

    /// Every candidate was unhealthy or at capacity.
    #[error("no healthy servers")]
    NoHealthyServers,

    /// An upstream URL could not be used for probing or forwarding.
    #[error("invalid upstream '{url}': {message}")]
    InvalidUpstream {
        /// Upstream URL as configured.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// A health probe failed.
    #[error("health check failed for {0}: {1}")]
    HealthCheckFailed(String, String),
}

/// Result type for load balancer operations.
pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadBalancerError::UnknownService("orders".to_string());
        assert_eq!(err.to_string(), "unknown service: orders");

        assert_eq!(
            LoadBalancerError::NoHealthyServers.to_string(),
            "no healthy servers"
        );

        let err = LoadBalancerError::HealthCheckFailed(
            "http://10.0.0.1:8080".to_string(),
            "connection refused".to_string(),
        );
        assert_eq!(
            err.to_string(),
            "health check failed for http://10.0.0.1:8080: connection refused"
        );
    }
}

//! Request pipeline errors and their HTTP mapping.

use super::request::ProxyResponse;
use crate::modules::deployment::DeploymentError;
use crate::modules::load_balancer::LoadBalancerError;
use http::{HeaderValue, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Reasons a request is answered by the balancer itself.
///
/// The display text of each variant is the response body.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Path has no service segment.
    #[error("Missing service name in path")]
    MissingService,

    /// Service is not registered.
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Client exceeded its quota.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited {
        /// Requests allowed per window.
        limit: u32,
    },

    /// Selected server's circuit is open.
    #[error("Service temporarily unavailable: {0}")]
    CircuitOpen(String),

    /// No server could be selected.
    #[error("Load Balancer Error: {0}")]
    NoServers(LoadBalancerError),

    /// Backend exchange failed.
    #[error("Load Balancer Error: {0}")]
    Upstream(String),

    /// Backend exchange exceeded the request timeout.
    #[error("Load Balancer Error: upstream timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for pipeline operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingService => StatusCode::BAD_REQUEST,
            Self::UnknownService(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitOpen(_) | Self::NoServers(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) | Self::Timeout(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether the backend was contacted and failed.
    #[must_use]
    pub fn is_forwarding_failure(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Timeout(_))
    }

    /// Render as a plain-text response.
    #[must_use]
    pub fn into_response(self) -> ProxyResponse {
        let mut response = ProxyResponse::text(self.status(), self.to_string());
        if let Self::RateLimited { limit } = self {
            response
                .headers
                .insert("x-ratelimit-limit", HeaderValue::from(limit));
            response
                .headers
                .insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        }
        response
    }
}

impl From<LoadBalancerError> for ProxyError {
    fn from(e: LoadBalancerError) -> Self {
        match e {
            LoadBalancerError::UnknownService(name) => Self::UnknownService(name),
            other => Self::NoServers(other),
        }
    }
}

impl From<DeploymentError> for ProxyError {
    fn from(e: DeploymentError) -> Self {
        match e {
            DeploymentError::UnknownService(name) => Self::UnknownService(name),
            other => Self::Upstream(other.to_string()),
        }
    }
}

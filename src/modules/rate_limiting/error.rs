//! Error types for rate limiting.

use std::fmt;

/// Result type for rate limiting operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors that can occur while building a rate limiter.
#[derive(Debug)]
pub enum RateLimitError {
    /// Invalid configuration.
    InvalidConfig(String),
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for RateLimitError {}

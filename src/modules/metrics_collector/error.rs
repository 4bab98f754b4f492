//! Metrics collector error types.

use std::fmt;

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors that can occur in the metrics collector module.
#[derive(Debug)]
pub enum MetricsError {
    /// Text exposition failed.
    Encode(fmt::Error),
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "Failed to encode metrics: {e}"),
        }
    }
}

impl std::error::Error for MetricsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
        }
    }
}

impl From<fmt::Error> for MetricsError {
    fn from(e: fmt::Error) -> Self {
        Self::Encode(e)
    }
}

//! Deployment errors.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the deployment manager.
#[derive(Debug, Error)]
pub enum DeploymentError {
    /// No environments are defined for the service.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// Scheduled switch time is not in the future.
    #[error("switch time must be in the future: {0}")]
    ScheduleInPast(DateTime<Utc>),

    /// Gradual ramp step count out of range.
    #[error("steps must be between 1 and 100, got {0}")]
    InvalidSteps(u32),

    /// Ramp duration too large to schedule.
    #[error("duration out of range: {0:?}")]
    InvalidDuration(Duration),
}

/// Result type for deployment operations.
pub type DeploymentResult<T> = Result<T, DeploymentError>;

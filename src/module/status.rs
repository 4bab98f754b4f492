//! Module status reporting.

/// Represents the current status of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Module is initializing.
    Initializing,

    /// Module is running normally.
    Running,

    /// Module is running but with degraded functionality.
    Degraded {
        /// Reason for degradation.
        reason: String,
    },

    /// Module is stopped.
    Stopped,

    /// Module encountered an error.
    Error {
        /// Error message.
        message: String,
    },
}

impl ModuleStatus {
    /// Returns `true` if the module is in a healthy state.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` if the module is operational (running or degraded).
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Running | Self::Degraded { .. })
    }

    /// Returns `true` if the module is stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Degraded { reason } => write!(f, "degraded: {reason}"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error { message } => write!(f, "error: {message}"),
        }
    }
}

//! Configuration validation system.

use super::types::BalancerConfig;
use std::collections::HashSet;

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation errors.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &BalancerConfig) -> ValidationResult;
}

/// Structural checks: listener, thresholds, limits and service names.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &BalancerConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if config.listener.port == 0 {
            result.add_error(ValidationError::error(
                "listener.port",
                "Listener port cannot be 0",
            ));
        }
        if config.listener.socket_addr().is_none() {
            result.add_error(ValidationError::error(
                "listener.bind_address",
                format!("Invalid bind address: {}", config.listener.bind_address),
            ));
        }

        let lb = &config.load_balancer;
        if lb.circuit_breaker.enabled {
            if lb.circuit_breaker.failure_threshold == 0 {
                result.add_error(ValidationError::error(
                    "load_balancer.circuit_breaker.failure_threshold",
                    "Failure threshold must be greater than 0",
                ));
            }
            if lb.circuit_breaker.success_threshold == 0 {
                result.add_error(ValidationError::error(
                    "load_balancer.circuit_breaker.success_threshold",
                    "Success threshold must be greater than 0",
                ));
            }
        }
        if lb.rate_limit.enabled {
            if lb.rate_limit.max_requests == 0 {
                result.add_error(ValidationError::error(
                    "load_balancer.rate_limit.max_requests",
                    "Max requests must be greater than 0",
                ));
            }
            if lb.rate_limit.window.is_zero() {
                result.add_error(ValidationError::error(
                    "load_balancer.rate_limit.window",
                    "Window must be greater than 0",
                ));
            }
        }
        if lb.health_check.enabled {
            if lb.health_check.max_retries == 0 {
                result.add_error(ValidationError::error(
                    "load_balancer.health_check.max_retries",
                    "Max retries must be at least 1",
                ));
            }
            if lb.health_check.interval.is_zero() {
                result.add_error(ValidationError::error(
                    "load_balancer.health_check.interval",
                    "Interval must be greater than 0",
                ));
            }
            if lb.health_check.timeout.is_zero() {
                result.add_error(ValidationError::error(
                    "load_balancer.health_check.timeout",
                    "Timeout must be greater than 0",
                ));
            }
        }
        if lb.sticky_session.enabled {
            if lb.sticky_session.cookie_name.is_empty() {
                result.add_error(ValidationError::error(
                    "load_balancer.sticky_session.cookie_name",
                    "Cookie name cannot be empty",
                ));
            }
            if lb.sticky_session.cleanup_interval.is_zero() {
                result.add_error(ValidationError::error(
                    "load_balancer.sticky_session.cleanup_interval",
                    "Cleanup interval must be greater than 0",
                ));
            }
        }

        if config.admin.enabled && !config.admin.path_prefix.starts_with('/') {
            result.add_error(ValidationError::error(
                "admin.path_prefix",
                "Admin prefix must start with '/'",
            ));
        }

        let mut seen_names = HashSet::new();
        for service in &config.services {
            if service.name.is_empty() {
                result.add_error(ValidationError::error(
                    "services[].name",
                    "Service name cannot be empty",
                ));
                continue;
            }
            if service.name.contains('/') {
                result.add_error(ValidationError::error(
                    format!("services.{}", service.name),
                    format!("Service name cannot contain '/': {}", service.name),
                ));
            }
            if !seen_names.insert(&service.name) {
                result.add_error(ValidationError::error(
                    format!("services.{}", service.name),
                    format!("Duplicate service name: {}", service.name),
                ));
            }
        }

        if config.services.is_empty() {
            result.add_error(ValidationError::warning("services", "No services configured"));
        }

        result
    }
}

/// Upstream checks: every service has upstreams with plain `http://` URLs.
#[derive(Debug, Default)]
pub struct UpstreamValidator;

impl UpstreamValidator {
    /// Create a new upstream validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for UpstreamValidator {
    fn validate(&self, config: &BalancerConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        for service in &config.services {
            if service.upstreams.is_empty() {
                result.add_error(ValidationError::error(
                    format!("services.{}.upstreams", service.name),
                    format!("Service {} has no upstreams", service.name),
                ));
            }

            let upstreams = service
                .upstreams
                .iter()
                .map(|u| ("upstreams", u))
                .chain(service.green_upstreams.iter().map(|u| ("green_upstreams", u)));
            for (list, upstream) in upstreams {
                let field = format!("services.{}.{list}", service.name);
                match upstream.url.parse::<http::Uri>() {
                    Ok(uri) if uri.scheme_str() == Some("http") && uri.host().is_some() => {},
                    Ok(_) => result.add_error(ValidationError::error(
                        field,
                        format!("Upstream must be an http:// URL with a host: {}", upstream.url),
                    )),
                    Err(e) => result.add_error(ValidationError::error(
                        field,
                        format!("Invalid upstream URL {}: {e}", upstream.url),
                    )),
                }
                if upstream.weight == 0 {
                    result.add_error(ValidationError::warning(
                        format!("services.{}.{list}", service.name),
                        format!("Upstream {} has weight 0, treated as 1", upstream.url),
                    ));
                }
            }
        }

        result
    }
}

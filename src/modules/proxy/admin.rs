//! Administrative JSON API.

use super::request::ProxyResponse;
use crate::modules::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::modules::deployment::{DeploymentError, DeploymentManager};
use crate::modules::load_balancer::{
    Algorithm, LoadBalancerError, Server, ServiceRegistry, ServiceStatus,
};
use crate::modules::rate_limiting::{RateLimitInfo, RateLimiter};
use crate::modules::sticky_session::SessionManager;
use chrono::{DateTime, Utc};
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
struct AlgorithmChange {
    algorithm: Algorithm,
}

#[derive(Debug, Deserialize)]
struct GradualSwitch {
    #[serde(with = "humantime_serde")]
    duration: Duration,
    steps: u32,
}

#[derive(Debug, Deserialize)]
struct ScheduledSwitch {
    at: DateTime<Utc>,
}

/// Which subsystems are active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Features {
    /// Health probing.
    pub health_check: bool,
    /// Circuit breaking.
    pub circuit_breaker: bool,
    /// Rate limiting.
    pub rate_limit: bool,
    /// Sticky sessions.
    pub sticky_session: bool,
    /// Services with blue-green environments.
    pub blue_green: Vec<String>,
}

/// Admin API over the balancer's components.
#[derive(Debug)]
pub struct AdminApi {
    registry: Arc<ServiceRegistry>,
    deployments: Arc<DeploymentManager>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    sessions: Option<Arc<SessionManager>>,
    health_check: bool,
}

fn error(status: StatusCode, message: impl Into<String>) -> ProxyResponse {
    ProxyResponse::json(status, &json!({ "error": message.into() }))
}

fn not_found() -> ProxyResponse {
    error(StatusCode::NOT_FOUND, "Not Found")
}

fn parse<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, ProxyResponse> {
    serde_json::from_slice(body)
        .map_err(|e| error(StatusCode::BAD_REQUEST, format!("invalid request body: {e}")))
}

fn lb_error(e: LoadBalancerError) -> ProxyResponse {
    match e {
        LoadBalancerError::UnknownService(_) => error(StatusCode::NOT_FOUND, e.to_string()),
        other => error(StatusCode::SERVICE_UNAVAILABLE, other.to_string()),
    }
}

fn deployment_error(e: DeploymentError) -> ProxyResponse {
    match e {
        DeploymentError::UnknownService(_) => error(StatusCode::NOT_FOUND, e.to_string()),
        other => error(StatusCode::BAD_REQUEST, other.to_string()),
    }
}

impl AdminApi {
    /// Create the admin API. Optional components that are `None` report as
    /// disabled.
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>, deployments: Arc<DeploymentManager>) -> Self {
        Self {
            registry,
            deployments,
            circuit_breaker: None,
            rate_limiter: None,
            sessions: None,
            health_check: false,
        }
    }

    /// Expose circuit states.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Expose rate limit quotas.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Expose session statistics.
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Report health checking as enabled or not.
    #[must_use]
    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    /// Enabled subsystems.
    #[must_use]
    pub fn features(&self) -> Features {
        Features {
            health_check: self.health_check,
            circuit_breaker: self.circuit_breaker.is_some(),
            rate_limit: self.rate_limiter.is_some(),
            sticky_session: self.sessions.is_some(),
            blue_green: self.deployments.services(),
        }
    }

    /// Dispatch an admin request. `path` is relative to the admin prefix.
    pub fn handle(&self, method: &Method, path: &str, body: &[u8]) -> ProxyResponse {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let result = match (method, segments.as_slice()) {
            (&Method::GET, ["services"]) => Ok(ProxyResponse::json(StatusCode::OK, &self.registry.service_names())),
            (&Method::GET, ["status"]) => Ok(self.status()),
            (&Method::GET, ["services", name]) => self
                .registry
                .details(name)
                .map(|details| ProxyResponse::json(StatusCode::OK, &details))
                .map_err(lb_error),
            (&Method::PUT, ["services", name, "algorithm"]) => self.change_algorithm(name, body),
            (&Method::GET, ["circuit-breakers"]) => Ok(self.circuit_breakers()),
            (&Method::GET, ["rate-limit", client]) => Ok(self.rate_limit(client)),
            (&Method::GET, ["sticky-sessions"]) => Ok(self.sticky_sessions()),
            (&Method::GET, ["features"]) => Ok(ProxyResponse::json(StatusCode::OK, &self.features())),
            (&Method::GET, ["deployments", name]) => self
                .deployments
                .status(name)
                .map(|status| ProxyResponse::json(StatusCode::OK, &status))
                .map_err(deployment_error),
            (&Method::POST, ["deployments", name, "switch"]) => self
                .deployments
                .switch_instant(name)
                .map(|active| {
                    ProxyResponse::json(StatusCode::OK, &json!({ "service": name, "active_environment": active }))
                })
                .map_err(deployment_error),
            (&Method::POST, ["deployments", name, "switch", "gradual"]) => self.switch_gradual(name, body),
            (&Method::POST, ["deployments", name, "switch", "scheduled"]) => self.switch_scheduled(name, body),
            (&Method::POST, ["deployments", name, "rollback"]) => self
                .deployments
                .rollback(name)
                .map(|active| {
                    ProxyResponse::json(StatusCode::OK, &json!({ "service": name, "active_environment": active }))
                })
                .map_err(deployment_error),
            _ => Err(not_found()),
        };

        result.unwrap_or_else(|response| response)
    }

    /// Registered servers plus green servers of blue-green services.
    fn servers(&self, name: &str) -> Vec<Arc<Server>> {
        self.deployments.servers_with(name, self.registry.servers(name))
    }

    fn status(&self) -> ProxyResponse {
        let status: BTreeMap<String, ServiceStatus> = self
            .registry
            .service_names()
            .into_iter()
            .filter_map(|name| {
                let algorithm = self.registry.algorithm(&name).ok()?;
                let status = ServiceStatus::new(&name, algorithm, &self.servers(&name));
                Some((name, status))
            })
            .collect();
        ProxyResponse::json(StatusCode::OK, &status)
    }

    fn change_algorithm(&self, name: &str, body: &[u8]) -> Result<ProxyResponse, ProxyResponse> {
        let change: AlgorithmChange = parse(body)?;
        self.registry
            .change_algorithm(name, change.algorithm)
            .map_err(lb_error)?;
        info!(service = %name, algorithm = %change.algorithm, "Algorithm changed via admin API");
        Ok(ProxyResponse::json(
            StatusCode::OK,
            &json!({ "service": name, "algorithm": change.algorithm }),
        ))
    }

    fn circuit_breakers(&self) -> ProxyResponse {
        let Some(breaker) = &self.circuit_breaker else {
            return ProxyResponse::json(StatusCode::OK, &json!({ "enabled": false }));
        };
        let states: BTreeMap<String, BTreeMap<String, CircuitState>> = self
            .registry
            .service_names()
            .into_iter()
            .map(|name| {
                let servers = self.servers(&name);
                (name, breaker.states(&servers))
            })
            .collect();
        ProxyResponse::json(StatusCode::OK, &states)
    }

    fn rate_limit(&self, client: &str) -> ProxyResponse {
        let info = self
            .rate_limiter
            .as_ref()
            .map_or(
                RateLimitInfo {
                    limit: 0,
                    remaining: 0,
                    reset_in_seconds: 0,
                },
                |limiter| limiter.rate_limit_info(client),
            );
        ProxyResponse::json(StatusCode::OK, &info)
    }

    fn sticky_sessions(&self) -> ProxyResponse {
        match &self.sessions {
            Some(sessions) => ProxyResponse::json(StatusCode::OK, &sessions.stats()),
            None => ProxyResponse::json(StatusCode::OK, &json!({ "enabled": false })),
        }
    }

    fn switch_gradual(&self, name: &str, body: &[u8]) -> Result<ProxyResponse, ProxyResponse> {
        let request: GradualSwitch = parse(body)?;
        self.deployments
            .switch_gradual(name, request.duration, request.steps)
            .map_err(deployment_error)?;
        let status = self.deployments.status(name).map_err(deployment_error)?;
        Ok(ProxyResponse::json(StatusCode::ACCEPTED, &status))
    }

    fn switch_scheduled(&self, name: &str, body: &[u8]) -> Result<ProxyResponse, ProxyResponse> {
        let request: ScheduledSwitch = parse(body)?;
        self.deployments
            .switch_scheduled(name, request.at)
            .map_err(deployment_error)?;
        Ok(ProxyResponse::json(
            StatusCode::ACCEPTED,
            &json!({ "service": name, "scheduled_at": request.at }),
        ))
    }
}

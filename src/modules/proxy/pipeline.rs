//! Per-request processing.

use super::config::ProxyConfig;
use super::error::{ProxyError, ProxyResult};
use super::forward::{Forwarder, OutboundRequest};
use super::headers::{
    backend_path, client_ip, cookie_value, session_cookie, split_service, upstream_headers,
};
use super::request::{ProxyRequest, ProxyResponse};
use crate::modules::circuit_breaker::CircuitBreaker;
use crate::modules::deployment::DeploymentManager;
use crate::modules::load_balancer::{Server, ServiceRegistry};
use crate::modules::metrics_collector::{MetricsSink, NoopMetrics};
use crate::modules::rate_limiting::RateLimiter;
use crate::modules::sticky_session::SessionManager;
use http::header::SET_COOKIE;
use http::HeaderValue;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// The request pipeline.
///
/// Steps run strictly in order and each may answer the request itself:
///
/// 1. rate limit by client identity
/// 2. resolve the service and select a server (blue-green aware)
/// 3. apply session affinity
/// 4. check the server's circuit
/// 5. forward and record the outcome
pub struct RequestPipeline {
    config: ProxyConfig,
    registry: Arc<ServiceRegistry>,
    forwarder: Arc<dyn Forwarder>,
    metrics: Arc<dyn MetricsSink>,
    deployments: Option<Arc<DeploymentManager>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    sessions: Option<Arc<SessionManager>>,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("config", &self.config)
            .field("services", &self.registry.service_names())
            .field("blue_green", &self.deployments.is_some())
            .field("circuit_breaker", &self.circuit_breaker.is_some())
            .field("rate_limiter", &self.rate_limiter.is_some())
            .field("sticky_sessions", &self.sessions.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    /// Create a pipeline with every optional stage disabled.
    #[must_use]
    pub fn new(config: ProxyConfig, registry: Arc<ServiceRegistry>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            config,
            registry,
            forwarder,
            metrics: Arc::new(NoopMetrics),
            deployments: None,
            circuit_breaker: None,
            rate_limiter: None,
            sessions: None,
        }
    }

    /// Record outcomes into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Route services with environments through blue-green selection.
    #[must_use]
    pub fn with_deployments(mut self, deployments: Arc<DeploymentManager>) -> Self {
        self.deployments = Some(deployments);
        self
    }

    /// Gate servers on their circuit.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Admit requests through a rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Bind sessions to servers.
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Process a request, turning pipeline errors into responses.
    pub async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        match self.route(request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    /// Process a request.
    ///
    /// # Errors
    ///
    /// Returns the first stage that refused the request, or the forwarding
    /// failure.
    pub async fn route(&self, request: ProxyRequest) -> ProxyResult<ProxyResponse> {
        let (service, rest) = split_service(&request.path).ok_or(ProxyError::MissingService)?;
        let client = client_ip(&request);

        if let Some(limiter) = &self.rate_limiter {
            if !limiter.allow_request(&client) {
                warn!(client = %client, service = %service, "Rate limit exceeded");
                return Err(ProxyError::RateLimited {
                    limit: limiter.config().max_requests,
                });
            }
        }

        let handle = self.registry.service(service)?;
        let selected = match &self.deployments {
            Some(deployments) if deployments.has_environment(service) => {
                let pool = deployments.active_servers(service)?;
                handle.select_from(&pool, &client)?
            },
            _ => handle.select(&client)?,
        };

        let (server, session_id) = match &self.sessions {
            Some(sessions) => {
                let session_id = cookie_value(&request.headers, &sessions.config().cookie_name)
                    .unwrap_or_else(SessionManager::generate_session_id);
                let server = sessions.get_or_assign_server(&session_id, &selected);
                (server, Some(session_id))
            },
            None => (selected, None),
        };

        if let Some(breaker) = &self.circuit_breaker {
            if !breaker.is_available(&server) {
                warn!(server = %server.url(), service = %service, "Circuit open, refusing request");
                return Err(ProxyError::CircuitOpen(server.url().to_string()));
            }
        }

        let mut url = format!(
            "{}{}",
            server.url().trim_end_matches('/'),
            backend_path(&request.path, rest, &self.config.introspection_prefix)
        );
        if let Some(query) = &request.query {
            url.push('?');
            url.push_str(query);
        }
        let outbound = OutboundRequest {
            method: request.method.clone(),
            headers: upstream_headers(&request, &client),
            body: request.body.clone(),
            url,
        };

        info!(
            method = %request.method,
            path = %request.path,
            backend = %outbound.url,
            client = %client,
            "Proxying request"
        );

        let strategy = handle.strategy();
        strategy.on_request_start(&server);
        server.record_request();
        let started = Instant::now();
        let result = self.forwarder.forward(outbound).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        strategy.on_request_complete(&server);

        match result {
            Ok(mut response) => {
                let failed = self.config.count_server_errors_as_failures
                    && response.status.is_server_error();
                if failed {
                    self.record_failure(service, &server, duration_ms);
                } else {
                    self.record_success(service, &server, duration_ms);
                }
                debug!(
                    status = response.status.as_u16(),
                    duration_ms,
                    server = %server.url(),
                    "Backend responded"
                );

                if let (Some(sessions), Some(id)) = (&self.sessions, session_id) {
                    let cookie = session_cookie(
                        &sessions.config().cookie_name,
                        &id,
                        sessions.config().timeout.as_secs(),
                    );
                    if let Ok(value) = HeaderValue::from_str(&cookie) {
                        response.headers.append(SET_COOKIE, value);
                    }
                }
                Ok(response)
            },
            Err(e) => {
                self.record_failure(service, &server, duration_ms);
                error!(
                    server = %server.url(),
                    duration_ms,
                    error = %e,
                    "Proxy error"
                );
                Err(e)
            },
        }
    }

    fn record_success(&self, service: &str, server: &Server, duration_ms: f64) {
        server.update_response_time(duration_ms);
        self.metrics.record_success(service, duration_ms);
        if let Some(breaker) = &self.circuit_breaker {
            breaker.record_success(server);
        }
    }

    fn record_failure(&self, service: &str, server: &Server, duration_ms: f64) {
        server.record_failure();
        self.metrics.record_error(service, duration_ms);
        if let Some(breaker) = &self.circuit_breaker {
            breaker.record_failure(server);
        }
    }
}

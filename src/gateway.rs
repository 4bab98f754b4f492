//! Top-level balancer module wiring every component together.

use crate::config::{BalancerConfig, BasicValidator, ConfigLoader, UpstreamValidator};
use crate::module::{
    Capability, MetricsPayload, ModuleConfig, ModuleContract, ModuleError, ModuleManifest,
    ModuleResult, ModuleStatus,
};
use crate::modules::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::modules::deployment::DeploymentManager;
use crate::modules::load_balancer::{HealthChecker, HealthProbe, HttpProbe, Server, ServiceRegistry};
use crate::modules::metrics_collector::LoadBalancerMetrics;
use crate::modules::proxy::{AdminApi, Dispatcher, Forwarder, HttpForwarder, RequestPipeline};
use crate::modules::rate_limiting::RateLimiter;
use crate::modules::scheduler::TaskScheduler;
use crate::modules::sticky_session::SessionManager;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything built from one configuration.
#[derive(Debug)]
struct Components {
    registry: Arc<ServiceRegistry>,
    health: Arc<HealthChecker>,
    breaker: Option<Arc<CircuitBreaker>>,
    limiter: Option<Arc<RateLimiter>>,
    sessions: Option<Arc<SessionManager>>,
    deployments: Arc<DeploymentManager>,
    dispatcher: Arc<Dispatcher>,
}

/// The load balancer as a lifecycle-managed module.
///
/// `init` (or [`Gateway::configure`]) builds the registry, resilience
/// components and the request dispatcher; `start` launches health checks and
/// session cleanup; `stop` aborts all background work.
pub struct Gateway {
    config: BalancerConfig,
    status: ModuleStatus,
    components: Option<Components>,
    forwarder: Option<Arc<dyn Forwarder>>,
    probe: Option<Arc<dyn HealthProbe>>,
    scheduler: TaskScheduler,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("status", &self.status)
            .field("services", &self.config.services.len())
            .field("configured", &self.components.is_some())
            .finish()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Create an unconfigured gateway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BalancerConfig::default(),
            status: ModuleStatus::Stopped,
            components: None,
            forwarder: None,
            probe: None,
            scheduler: TaskScheduler::new(),
        }
    }

    /// Use `forwarder` for backend calls instead of the HTTP client.
    #[must_use]
    pub fn with_forwarder(mut self, forwarder: Arc<dyn Forwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Use `probe` for health checks instead of HTTP probing.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Validate and apply an already parsed configuration.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if validation fails.
    pub fn configure(&mut self, config: BalancerConfig) -> ModuleResult<()> {
        Self::loader()
            .validate(&config)
            .map_err(|e| ModuleError::ConfigError(e.to_string()))?;
        self.apply(config);
        Ok(())
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Dispatcher for inbound requests; `None` before configuration.
    #[must_use]
    pub fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.components.as_ref().map(|c| Arc::clone(&c.dispatcher))
    }

    /// Service registry; `None` before configuration.
    #[must_use]
    pub fn registry(&self) -> Option<Arc<ServiceRegistry>> {
        self.components.as_ref().map(|c| Arc::clone(&c.registry))
    }

    fn loader() -> ConfigLoader {
        ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .with_validator(UpstreamValidator::new())
    }

    fn apply(&mut self, config: BalancerConfig) {
        self.components = Some(self.build(&config));
        self.config = config;
        self.status = ModuleStatus::Initializing;
    }

    fn build(&self, config: &BalancerConfig) -> Components {
        let lb = &config.load_balancer;
        let registry = Arc::new(ServiceRegistry::from_config(lb, &config.services));

        let probe: Arc<dyn HealthProbe> = match &self.probe {
            Some(probe) => Arc::clone(probe),
            None => Arc::new(HttpProbe::new(lb.health_check.path.clone())),
        };
        let health = Arc::new(HealthChecker::new(lb.health_check.clone(), probe));
        for server in registry.all_servers() {
            health.register(server);
        }

        let deployments = Arc::new(DeploymentManager::new());
        for service in config.services.iter().filter(|s| s.has_green()) {
            let green: Vec<Arc<Server>> = service
                .green_upstreams
                .iter()
                .map(|u| Arc::new(Server::from_config(u)))
                .collect();
            for server in &green {
                health.register(Arc::clone(server));
            }
            deployments.define_environments(&service.name, registry.servers(&service.name), green);
        }

        let breaker = lb
            .circuit_breaker
            .enabled
            .then(|| Arc::new(CircuitBreaker::new(lb.circuit_breaker.clone())));
        let limiter = if lb.rate_limit.enabled {
            match RateLimiter::new(lb.rate_limit.clone()) {
                Ok(limiter) => Some(Arc::new(limiter)),
                Err(e) => {
                    warn!(error = %e, "Rate limiting disabled");
                    None
                },
            }
        } else {
            None
        };
        let sessions = lb
            .sticky_session
            .enabled
            .then(|| Arc::new(SessionManager::new(lb.sticky_session.clone())));

        let forwarder: Arc<dyn Forwarder> = match &self.forwarder {
            Some(forwarder) => Arc::clone(forwarder),
            None => Arc::new(HttpForwarder::new(config.proxy.request_timeout)),
        };
        let metrics = Arc::new(LoadBalancerMetrics::new());

        let mut pipeline =
            RequestPipeline::new(config.proxy.clone(), Arc::clone(&registry), forwarder)
                .with_metrics(Arc::clone(&metrics) as _)
                .with_deployments(Arc::clone(&deployments));
        let mut admin = AdminApi::new(Arc::clone(&registry), Arc::clone(&deployments))
            .with_health_check(lb.health_check.enabled);
        if let Some(breaker) = &breaker {
            pipeline = pipeline.with_circuit_breaker(Arc::clone(breaker));
            admin = admin.with_circuit_breaker(Arc::clone(breaker));
        }
        if let Some(limiter) = &limiter {
            pipeline = pipeline.with_rate_limiter(Arc::clone(limiter));
            admin = admin.with_rate_limiter(Arc::clone(limiter));
        }
        if let Some(sessions) = &sessions {
            pipeline = pipeline.with_sessions(Arc::clone(sessions));
            admin = admin.with_sessions(Arc::clone(sessions));
        }

        let mut dispatcher = Dispatcher::new(pipeline);
        if config.admin.enabled {
            dispatcher = dispatcher.with_admin(config.admin.path_prefix.clone(), admin);
        }
        if config.metrics.enabled {
            dispatcher = dispatcher.with_metrics(
                config.metrics.path.clone(),
                metrics,
                Arc::clone(&registry),
                Arc::clone(&deployments),
            );
        }

        debug!(
            services = config.services.len(),
            blue_green = deployments.services().len(),
            "Built balancer components"
        );

        Components {
            registry,
            health,
            breaker,
            limiter,
            sessions,
            deployments,
            dispatcher: Arc::new(dispatcher),
        }
    }
}

impl ModuleContract for Gateway {
    fn manifest(&self) -> ModuleManifest {
        ModuleManifest::builder("r0n-balancer")
            .description("Reverse-proxy load balancer")
            .version(0, 1, 0)
            .capability(Capability::HttpProtocol)
            .capability(Capability::LoadBalancing)
            .capability(Capability::RateLimiting)
            .capability(Capability::CircuitBreaking)
            .capability(Capability::StickySessions)
            .capability(Capability::TrafficShifting)
            .capability(Capability::Metrics)
            .build()
    }

    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()> {
        info!("Initializing balancer");

        let config = match config.raw_config() {
            Some(raw) => Self::loader()
                .load_str(raw)
                .map_err(|e| ModuleError::ConfigError(e.to_string()))?,
            None => BalancerConfig::default(),
        };
        if config.services.is_empty() {
            warn!("No services configured");
        }

        self.apply(config);
        info!(services = self.config.services.len(), "Balancer initialized");
        Ok(())
    }

    fn start(&mut self) -> ModuleResult<()> {
        if self.status == ModuleStatus::Running {
            return Err(ModuleError::InvalidState {
                current: "running".to_string(),
                expected: "initialized or stopped".to_string(),
            });
        }
        let Some(components) = &self.components else {
            return Err(ModuleError::InvalidState {
                current: self.status.to_string(),
                expected: "initialized".to_string(),
            });
        };

        info!("Starting balancer");
        components.health.start(&self.scheduler);
        if let Some(sessions) = &components.sessions {
            sessions.start_cleanup(&self.scheduler);
        }

        self.status = ModuleStatus::Running;
        info!(tasks = self.scheduler.active_tasks(), "Balancer started");
        Ok(())
    }

    fn stop(&mut self) -> ModuleResult<()> {
        if self.status != ModuleStatus::Running {
            return Err(ModuleError::InvalidState {
                current: self.status.to_string(),
                expected: "running".to_string(),
            });
        }

        info!("Stopping balancer");
        self.scheduler.shutdown();
        if let Some(components) = &self.components {
            components.deployments.shutdown();
        }

        self.status = ModuleStatus::Stopped;
        info!("Balancer stopped");
        Ok(())
    }

    fn reload(&mut self, config: ModuleConfig) -> ModuleResult<()> {
        info!("Reloading balancer configuration");
        let was_running = self.status == ModuleStatus::Running;
        if was_running {
            self.stop()?;
        }

        self.init(config)?;

        if was_running {
            self.start()?;
        }
        info!("Balancer reloaded");
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        self.status.clone()
    }

    fn metrics(&self) -> MetricsPayload {
        let mut metrics = MetricsPayload::new();
        let Some(components) = &self.components else {
            return metrics;
        };

        let stats = components.registry.stats();
        metrics.counter(
            "total_selections",
            stats.total_selections.load(Ordering::Relaxed),
        );
        metrics.counter(
            "failed_selections",
            stats.failed_selections.load(Ordering::Relaxed),
        );
        metrics.counter(
            "health_checks",
            components.health.stats().checks.load(Ordering::Relaxed),
        );
        metrics.counter(
            "health_check_failures",
            components.health.stats().failures.load(Ordering::Relaxed),
        );

        let servers = components.registry.all_servers();
        let healthy = servers.iter().filter(|s| s.is_healthy()).count();
        metrics.gauge("services", components.registry.service_names().len() as f64);
        metrics.gauge("servers", servers.len() as f64);
        metrics.gauge("healthy_servers", healthy as f64);

        if let Some(limiter) = &components.limiter {
            let (checks, allowed, denied) = limiter.stats();
            metrics.counter("rate_limit_checks", checks);
            metrics.counter("rate_limit_allowed", allowed);
            metrics.counter("rate_limit_denied", denied);
        }
        if let Some(sessions) = &components.sessions {
            metrics.gauge("sessions", sessions.session_count() as f64);
        }
        if let Some(breaker) = &components.breaker {
            let open = breaker
                .states(servers.iter())
                .values()
                .filter(|state| **state != CircuitState::Closed)
                .count();
            metrics.gauge("circuits_not_closed", open as f64);
        }

        metrics
    }
}

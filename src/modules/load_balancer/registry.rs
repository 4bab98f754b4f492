//! Service registry: the per-service server pools and their strategies.

use super::config::{Algorithm, LoadBalancerConfig, ServiceConfig};
use super::error::{LoadBalancerError, LoadBalancerResult};
use super::server::{Server, ServerSnapshot};
use super::strategy::{Strategy, StrategyContainer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Selection statistics.
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Total selections made.
    pub total_selections: AtomicU64,
    /// Selections that produced a server.
    pub successful_selections: AtomicU64,
    /// Selections that failed (no available or healthy server).
    pub failed_selections: AtomicU64,
}

impl RegistryStats {
    /// Record a selection outcome.
    pub fn record_selection(&self, success: bool) {
        self.total_selections.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_selections.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_selections.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Servers and strategy of one service, resolved together.
///
/// Holding a handle keeps the strategy that picked a server around for its
/// request hooks even if the algorithm is swapped concurrently.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    name: String,
    servers: Arc<[Arc<Server>]>,
    strategy: Arc<StrategyContainer>,
}

impl ServiceHandle {
    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered servers in configuration order.
    #[must_use]
    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }

    /// The service's strategy.
    #[must_use]
    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_strategy()
    }

    /// The algorithm the service currently runs.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.strategy.algorithm()
    }

    /// Select one of the registered servers.
    ///
    /// # Errors
    ///
    /// See [`Strategy::select`].
    pub fn select(&self, client_ip: &str) -> LoadBalancerResult<Arc<Server>> {
        self.select_from(&self.servers, client_ip)
    }

    /// Select from an explicit pool with this service's strategy.
    ///
    /// Used when blue-green shifting supplies the serving set.
    ///
    /// # Errors
    ///
    /// See [`Strategy::select`].
    pub fn select_from(
        &self,
        servers: &[Arc<Server>],
        client_ip: &str,
    ) -> LoadBalancerResult<Arc<Server>> {
        self.strategy().select(servers, client_ip)
    }
}

#[derive(Debug)]
struct ServicePool {
    servers: Arc<[Arc<Server>]>,
    strategy: Arc<StrategyContainer>,
}

/// Per-service status for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Service name.
    pub service: String,
    /// Active algorithm.
    pub algorithm: Algorithm,
    /// Server snapshots.
    pub servers: Vec<ServerSnapshot>,
    /// Healthy servers.
    pub healthy_count: usize,
    /// All servers.
    pub total_servers: usize,
}

impl ServiceStatus {
    /// Snapshot `servers` as the state of service `name`.
    #[must_use]
    pub fn new(name: &str, algorithm: Algorithm, servers: &[Arc<Server>]) -> Self {
        let servers: Vec<ServerSnapshot> = servers.iter().map(|s| s.snapshot()).collect();
        let healthy_count = servers.iter().filter(|s| s.healthy).count();
        Self {
            service: name.to_string(),
            algorithm,
            total_servers: servers.len(),
            healthy_count,
            servers,
        }
    }
}

/// Per-service traffic totals for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDetails {
    /// Service name.
    pub service: String,
    /// Active algorithm.
    pub algorithm: Algorithm,
    /// Server snapshots.
    pub servers: Vec<ServerSnapshot>,
    /// Requests forwarded across all servers.
    pub total_requests: u64,
    /// Failed requests across all servers.
    pub total_failed: u64,
    /// Success percentage across all servers.
    pub success_rate: f64,
}

/// Registry of services, created at startup and alive for the process.
///
/// Reads vastly outnumber writes; writes only happen on registration and on
/// algorithm changes.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServicePool>>,
    stats: RegistryStats,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration.
    ///
    /// A service-level algorithm overrides the global default.
    #[must_use]
    pub fn from_config(config: &LoadBalancerConfig, services: &[ServiceConfig]) -> Self {
        let registry = Self::new();
        for service in services {
            let servers = service
                .upstreams
                .iter()
                .map(|u| Arc::new(Server::from_config(u)))
                .collect();
            registry.register(
                &service.name,
                servers,
                service.effective_algorithm(config.algorithm),
            );
        }
        registry
    }

    /// Register (or replace) a service.
    pub fn register(&self, name: &str, servers: Vec<Arc<Server>>, algorithm: Algorithm) {
        info!(
            service = %name,
            servers = servers.len(),
            algorithm = %algorithm,
            "Registered service"
        );

        let mut services = self.services.write().expect("services lock poisoned");
        services.insert(
            name.to_string(),
            ServicePool {
                servers: servers.into(),
                strategy: Arc::new(StrategyContainer::create(algorithm)),
            },
        );
    }

    /// Get the statistics.
    #[must_use]
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Resolve a service to its servers and strategy.
    ///
    /// # Errors
    ///
    /// `UnknownService` if the name is not registered.
    pub fn service(&self, name: &str) -> LoadBalancerResult<ServiceHandle> {
        let services = self.services.read().expect("services lock poisoned");
        let pool = services
            .get(name)
            .ok_or_else(|| LoadBalancerError::UnknownService(name.to_string()))?;

        Ok(ServiceHandle {
            name: name.to_string(),
            servers: Arc::clone(&pool.servers),
            strategy: Arc::clone(&pool.strategy),
        })
    }

    /// Select a server for the client.
    ///
    /// # Errors
    ///
    /// `UnknownService` for an unregistered or empty service, otherwise the
    /// strategy's selection error.
    pub fn select_server(&self, name: &str, client_ip: &str) -> LoadBalancerResult<Arc<Server>> {
        let handle = self.service(name)?;
        if handle.servers().is_empty() {
            return Err(LoadBalancerError::UnknownService(name.to_string()));
        }

        let result = handle.select(client_ip);
        self.stats.record_selection(result.is_ok());
        if let Ok(server) = &result {
            debug!(service = %name, server = %server.url(), client = %client_ip, "Selected server");
        }
        result
    }

    /// Servers of a service; empty for an unknown service.
    #[must_use]
    pub fn servers(&self, name: &str) -> Vec<Arc<Server>> {
        self.service(name)
            .map(|h| h.servers().to_vec())
            .unwrap_or_default()
    }

    /// The algorithm a service runs.
    ///
    /// # Errors
    ///
    /// `UnknownService` if the name is not registered.
    pub fn algorithm(&self, name: &str) -> LoadBalancerResult<Algorithm> {
        self.service(name).map(|h| h.algorithm())
    }

    /// Replace a service's strategy with a fresh one, discarding its state.
    ///
    /// # Errors
    ///
    /// `UnknownService` if the name is not registered.
    pub fn change_algorithm(&self, name: &str, algorithm: Algorithm) -> LoadBalancerResult<()> {
        let mut services = self.services.write().expect("services lock poisoned");
        let pool = services
            .get_mut(name)
            .ok_or_else(|| LoadBalancerError::UnknownService(name.to_string()))?;

        let previous = pool.strategy.algorithm();
        pool.strategy = Arc::new(StrategyContainer::create(algorithm));
        info!(service = %name, from = %previous, to = %algorithm, "Changed algorithm");
        Ok(())
    }

    /// Registered service names, sorted.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        let services = self.services.read().expect("services lock poisoned");
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every registered server across all services.
    #[must_use]
    pub fn all_servers(&self) -> Vec<Arc<Server>> {
        let services = self.services.read().expect("services lock poisoned");
        services
            .values()
            .flat_map(|pool| pool.servers.iter().cloned())
            .collect()
    }

    /// Status of one service.
    ///
    /// # Errors
    ///
    /// `UnknownService` if the name is not registered.
    pub fn status(&self, name: &str) -> LoadBalancerResult<ServiceStatus> {
        let handle = self.service(name)?;
        Ok(ServiceStatus::new(name, handle.algorithm(), handle.servers()))
    }

    /// Traffic totals of one service.
    ///
    /// # Errors
    ///
    /// `UnknownService` if the name is not registered.
    pub fn details(&self, name: &str) -> LoadBalancerResult<ServiceDetails> {
        let handle = self.service(name)?;
        let servers: Vec<ServerSnapshot> = handle.servers().iter().map(|s| s.snapshot()).collect();
        let total_requests: u64 = servers.iter().map(|s| s.total_requests).sum();
        let total_failed: u64 = servers.iter().map(|s| s.failed_requests).sum();
        let success_rate = if total_requests == 0 {
            100.0
        } else {
            (total_requests - total_failed.min(total_requests)) as f64 / total_requests as f64
                * 100.0
        };

        Ok(ServiceDetails {
            service: name.to_string(),
            algorithm: handle.algorithm(),
            servers,
            total_requests,
            total_failed,
            success_rate,
        })
    }
}

//! Load balancing strategies.
//!
//! Every strategy selects one server out of a pool for a client IP. A
//! strategy instance belongs to exactly one service; the factory
//! [`StrategyContainer::create`] hands out a fresh instance on every call so
//! no rotation state is ever shared between services.

use super::config::Algorithm;
use super::error::{LoadBalancerError, LoadBalancerResult};
use super::server::Server;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Key hashed in place of an empty client IP.
const UNKNOWN_CLIENT: &str = "unknown";

/// Trait for load balancing strategies.
pub trait Strategy: Send + Sync {
    /// Select a server from the pool.
    ///
    /// # Errors
    ///
    /// `NoAvailableServers` for an empty pool, `NoHealthyServers` when every
    /// candidate is unhealthy or at capacity.
    fn select(&self, servers: &[Arc<Server>], client_ip: &str) -> LoadBalancerResult<Arc<Server>>;

    /// Called before a request is forwarded to `server`.
    fn on_request_start(&self, _server: &Server) {}

    /// Called after a request to `server` finished, successfully or not.
    fn on_request_complete(&self, _server: &Server) {}

    /// The algorithm this strategy implements.
    fn algorithm(&self) -> Algorithm;

    /// Get the strategy name.
    fn name(&self) -> &'static str {
        self.algorithm().as_str()
    }
}

/// Healthy server with the fewest active connections, ignoring capacity.
fn least_loaded_healthy(servers: &[Arc<Server>]) -> Option<Arc<Server>> {
    servers
        .iter()
        .filter(|s| s.is_healthy())
        .min_by_key(|s| s.stats().active_connection_count())
        .cloned()
}

/// Advance `cursor` over `servers`, skipping unavailable entries for one full
/// lap before falling back to the least loaded healthy server.
fn rotate(cursor: &AtomicUsize, servers: &[Arc<Server>]) -> LoadBalancerResult<Arc<Server>> {
    if servers.is_empty() {
        return Err(LoadBalancerError::NoAvailableServers);
    }

    let len = servers.len();
    for _ in 0..len {
        let idx = cursor.fetch_add(1, Ordering::Relaxed) % len;
        let server = &servers[idx];
        if server.is_available() {
            return Ok(Arc::clone(server));
        }
    }

    least_loaded_healthy(servers).ok_or(LoadBalancerError::NoHealthyServers)
}

/// Round-robin load balancing strategy.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    /// Rotation cursor.
    current: AtomicUsize,
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RoundRobinStrategy {
    fn select(&self, servers: &[Arc<Server>], _client_ip: &str) -> LoadBalancerResult<Arc<Server>> {
        rotate(&self.current, servers)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::RoundRobin
    }
}

/// Least-connections load balancing strategy.
///
/// Ties on active connections go to the server with fewer requests overall.
#[derive(Debug, Default)]
pub struct LeastConnectionsStrategy;

impl LeastConnectionsStrategy {
    /// Create a new least-connections strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for LeastConnectionsStrategy {
    fn select(&self, servers: &[Arc<Server>], _client_ip: &str) -> LoadBalancerResult<Arc<Server>> {
        if servers.is_empty() {
            return Err(LoadBalancerError::NoAvailableServers);
        }

        servers
            .iter()
            .filter(|s| s.is_available())
            .map(|s| {
                let stats = s.stats();
                (
                    stats.active_connection_count(),
                    stats.total_request_count(),
                    s,
                )
            })
            .min_by_key(|(active, total, _)| (*active, *total))
            .map(|(_, _, s)| Arc::clone(s))
            .ok_or(LoadBalancerError::NoHealthyServers)
    }

    fn on_request_start(&self, server: &Server) {
        server.increment_connections();
    }

    fn on_request_complete(&self, server: &Server) {
        server.decrement_connections();
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::LeastConnections
    }
}

/// Client IP hash strategy.
///
/// The same client lands on the same server while pool membership and health
/// stay stable; unavailable servers are skipped by probing forward.
#[derive(Debug, Default)]
pub struct IpHashStrategy;

impl IpHashStrategy {
    /// Create a new IP hash strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn hash_key(client_ip: &str) -> u64 {
        let key = client_ip.trim();
        let key = if key.is_empty() { UNKNOWN_CLIENT } else { key };
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

impl Strategy for IpHashStrategy {
    fn select(&self, servers: &[Arc<Server>], client_ip: &str) -> LoadBalancerResult<Arc<Server>> {
        if servers.is_empty() {
            return Err(LoadBalancerError::NoAvailableServers);
        }

        let len = servers.len();
        let start = (Self::hash_key(client_ip) % len as u64) as usize;
        (0..len)
            .map(|offset| &servers[(start + offset) % len])
            .find(|s| s.is_available())
            .cloned()
            .ok_or(LoadBalancerError::NoHealthyServers)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::IpHash
    }
}

/// Pool expanded by weight, remembered together with the pool it came from.
#[derive(Debug, Default)]
struct ExpandedPool {
    source: Vec<Arc<Server>>,
    expanded: Vec<Arc<Server>>,
}

impl ExpandedPool {
    fn build(servers: &[Arc<Server>]) -> Self {
        let expanded = servers
            .iter()
            .flat_map(|s| std::iter::repeat_n(Arc::clone(s), s.weight().max(1) as usize))
            .collect();
        Self {
            source: servers.to_vec(),
            expanded,
        }
    }

    /// Identity comparison: same servers, same order.
    fn matches(&self, servers: &[Arc<Server>]) -> bool {
        self.source.len() == servers.len()
            && self
                .source
                .iter()
                .zip(servers)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

/// Weighted round-robin load balancing strategy.
///
/// Each server appears `weight` times in the rotation.
#[derive(Debug, Default)]
pub struct WeightedRoundRobinStrategy {
    current: AtomicUsize,
    pool: RwLock<ExpandedPool>,
}

impl WeightedRoundRobinStrategy {
    /// Create a new weighted round-robin strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the current weight-expanded rotation.
    #[must_use]
    pub fn expanded_len(&self) -> usize {
        self.pool.read().expect("pool lock poisoned").expanded.len()
    }
}

impl Strategy for WeightedRoundRobinStrategy {
    fn select(&self, servers: &[Arc<Server>], _client_ip: &str) -> LoadBalancerResult<Arc<Server>> {
        if servers.is_empty() {
            return Err(LoadBalancerError::NoAvailableServers);
        }

        {
            let pool = self.pool.read().expect("pool lock poisoned");
            if pool.matches(servers) {
                return rotate(&self.current, &pool.expanded);
            }
        }

        let mut pool = self.pool.write().expect("pool lock poisoned");
        if !pool.matches(servers) {
            *pool = ExpandedPool::build(servers);
        }
        rotate(&self.current, &pool.expanded)
    }

    fn on_request_start(&self, server: &Server) {
        server.increment_connections();
    }

    fn on_request_complete(&self, server: &Server) {
        server.decrement_connections();
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::WeightedRoundRobin
    }
}

/// Random load balancing strategy.
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    /// Create a new random strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for RandomStrategy {
    fn select(&self, servers: &[Arc<Server>], _client_ip: &str) -> LoadBalancerResult<Arc<Server>> {
        if servers.is_empty() {
            return Err(LoadBalancerError::NoAvailableServers);
        }

        let available: Vec<&Arc<Server>> = servers.iter().filter(|s| s.is_available()).collect();
        if available.is_empty() {
            return Err(LoadBalancerError::NoHealthyServers);
        }

        let idx = rand::RngExt::random_range(&mut rand::rng(), 0..available.len());
        Ok(Arc::clone(available[idx]))
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Random
    }
}

/// Tagged wrapper over the concrete strategies.
#[derive(Debug)]
pub enum StrategyContainer {
    /// Round-robin distribution.
    RoundRobin(RoundRobinStrategy),
    /// Least connections.
    LeastConnections(LeastConnectionsStrategy),
    /// Client IP hash.
    IpHash(IpHashStrategy),
    /// Weighted round-robin.
    WeightedRoundRobin(WeightedRoundRobinStrategy),
    /// Random selection.
    Random(RandomStrategy),
}

impl StrategyContainer {
    /// Build a fresh strategy for `algorithm`.
    #[must_use]
    pub fn create(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::RoundRobin => Self::RoundRobin(RoundRobinStrategy::new()),
            Algorithm::LeastConnections => Self::LeastConnections(LeastConnectionsStrategy::new()),
            Algorithm::IpHash => Self::IpHash(IpHashStrategy::new()),
            Algorithm::WeightedRoundRobin => {
                Self::WeightedRoundRobin(WeightedRoundRobinStrategy::new())
            },
            Algorithm::Random => Self::Random(RandomStrategy::new()),
        }
    }

    /// Get the strategy as a trait object.
    #[must_use]
    pub fn as_strategy(&self) -> &dyn Strategy {
        match self {
            Self::RoundRobin(s) => s,
            Self::LeastConnections(s) => s,
            Self::IpHash(s) => s,
            Self::WeightedRoundRobin(s) => s,
            Self::Random(s) => s,
        }
    }

    /// The algorithm of the wrapped strategy.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.as_strategy().algorithm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn make_servers(count: usize) -> Vec<Arc<Server>> {
        (0..count)
            .map(|i| Arc::new(Server::new(format!("http://10.0.0.{}:8080", i + 1), 1, 100)))
            .collect()
    }

    fn urls(servers: &[Arc<Server>]) -> Vec<String> {
        servers.iter().map(|s| s.url().to_string()).collect()
    }

    #[test]
    fn test_round_robin() {
        let servers = make_servers(3);
        let strategy = RoundRobinStrategy::new();

        let picks: Vec<Arc<Server>> = (0..4)
            .map(|_| strategy.select(&servers, "").unwrap())
            .collect();

        assert_eq!(urls(&picks[..3]), urls(&servers));
        assert!(Arc::ptr_eq(&picks[3], &picks[0]));
    }

    #[test]
    fn test_round_robin_skips_unhealthy() {
        let servers = make_servers(3);
        servers[1].set_healthy(false);
        let strategy = RoundRobinStrategy::new();

        for _ in 0..6 {
            let selected = strategy.select(&servers, "").unwrap();
            assert_ne!(selected.url(), servers[1].url());
        }
    }

    #[test]
    fn test_round_robin_falls_back_to_least_loaded() {
        let servers: Vec<Arc<Server>> = (0..2)
            .map(|i| Arc::new(Server::new(format!("http://10.0.0.{}:8080", i + 1), 1, 1)))
            .collect();
        servers[0].increment_connections();
        servers[0].increment_connections();
        servers[1].increment_connections();

        let strategy = RoundRobinStrategy::new();
        let selected = strategy.select(&servers, "").unwrap();
        assert_eq!(selected.url(), servers[1].url());
    }

    #[test]
    fn test_empty_pool() {
        for algorithm in Algorithm::ALL {
            let strategy = StrategyContainer::create(algorithm);
            let result = strategy.as_strategy().select(&[], "10.0.0.5");
            assert!(
                matches!(result, Err(LoadBalancerError::NoAvailableServers)),
                "{algorithm} should reject an empty pool"
            );
        }
    }

    #[test]
    fn test_all_unhealthy() {
        let servers = make_servers(3);
        for server in &servers {
            server.set_healthy(false);
        }

        for algorithm in Algorithm::ALL {
            let strategy = StrategyContainer::create(algorithm);
            let result = strategy.as_strategy().select(&servers, "10.0.0.5");
            assert!(
                matches!(result, Err(LoadBalancerError::NoHealthyServers)),
                "{algorithm} should report no healthy servers"
            );
        }
    }

    #[test]
    fn test_least_connections() {
        let servers = make_servers(3);
        let strategy = LeastConnectionsStrategy::new();

        servers[0].increment_connections();
        servers[0].increment_connections();
        servers[2].increment_connections();

        let selected = strategy.select(&servers, "").unwrap();
        assert_eq!(selected.url(), servers[1].url());
    }

    #[test]
    fn test_least_connections_tie_break() {
        let servers = make_servers(3);
        let strategy = LeastConnectionsStrategy::new();

        servers[0].record_request();
        servers[0].record_request();
        servers[1].record_request();
        servers[2].record_request();
        servers[2].record_request();

        let selected = strategy.select(&servers, "").unwrap();
        assert_eq!(selected.url(), servers[1].url());
    }

    #[test]
    fn test_least_connections_hooks() {
        let servers = make_servers(1);
        let strategy = LeastConnectionsStrategy::new();

        strategy.on_request_start(&servers[0]);
        assert_eq!(servers[0].stats().active_connection_count(), 1);
        strategy.on_request_complete(&servers[0]);
        assert_eq!(servers[0].stats().active_connection_count(), 0);
    }

    #[test]
    fn test_round_robin_hooks_are_noops() {
        let servers = make_servers(1);
        let strategy = RoundRobinStrategy::new();

        strategy.on_request_start(&servers[0]);
        assert_eq!(servers[0].stats().active_connection_count(), 0);
    }

    #[test]
    fn test_ip_hash_deterministic() {
        let servers = make_servers(5);
        let strategy = IpHashStrategy::new();

        let first = strategy.select(&servers, "192.168.1.100").unwrap();
        for _ in 0..10 {
            let again = strategy.select(&servers, "192.168.1.100").unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
    }

    #[test]
    fn test_ip_hash_blank_client() {
        let servers = make_servers(5);
        let strategy = IpHashStrategy::new();

        let empty = strategy.select(&servers, "").unwrap();
        let blank = strategy.select(&servers, "   ").unwrap();
        let sentinel = strategy.select(&servers, UNKNOWN_CLIENT).unwrap();
        assert!(Arc::ptr_eq(&empty, &blank));
        assert!(Arc::ptr_eq(&empty, &sentinel));
    }

    #[test]
    fn test_ip_hash_probes_forward() {
        let servers = make_servers(4);
        let strategy = IpHashStrategy::new();

        let first = strategy.select(&servers, "10.1.1.1").unwrap();
        first.set_healthy(false);

        let idx = servers
            .iter()
            .position(|s| Arc::ptr_eq(s, &first))
            .unwrap();
        let next = strategy.select(&servers, "10.1.1.1").unwrap();
        assert!(Arc::ptr_eq(&next, &servers[(idx + 1) % servers.len()]));
    }

    #[test]
    fn test_weighted_round_robin() {
        let servers = vec![
            Arc::new(Server::new("http://10.0.0.1:8080", 3, 100)),
            Arc::new(Server::new("http://10.0.0.2:8080", 1, 100)),
        ];
        let strategy = WeightedRoundRobinStrategy::new();

        let picks: Vec<String> = (0..8)
            .map(|_| strategy.select(&servers, "").unwrap().url().to_string())
            .collect();

        let heavy = picks.iter().filter(|u| *u == "http://10.0.0.1:8080").count();
        assert_eq!(heavy, 6);
        assert_eq!(strategy.expanded_len(), 4);
    }

    #[test]
    fn test_weighted_round_robin_zero_weight_counts_once() {
        let servers = vec![
            Arc::new(Server::new("http://10.0.0.1:8080", 0, 100)),
            Arc::new(Server::new("http://10.0.0.2:8080", 2, 100)),
        ];
        let strategy = WeightedRoundRobinStrategy::new();
        strategy.select(&servers, "").unwrap();
        assert_eq!(strategy.expanded_len(), 3);
    }

    #[test]
    fn test_weighted_round_robin_rebuilds_on_new_pool() {
        let first = make_servers(2);
        let second = make_servers(3);
        let strategy = WeightedRoundRobinStrategy::new();

        strategy.select(&first, "").unwrap();
        assert_eq!(strategy.expanded_len(), 2);

        strategy.select(&second, "").unwrap();
        assert_eq!(strategy.expanded_len(), 3);

        // Same servers in a freshly allocated list keep the expansion.
        let copy: Vec<Arc<Server>> = second.iter().map(Arc::clone).collect();
        strategy.select(&copy, "").unwrap();
        assert_eq!(strategy.expanded_len(), 3);
    }

    #[test]
    fn test_random_only_available() {
        let servers = make_servers(3);
        servers[0].set_healthy(false);
        servers[2].set_healthy(false);
        let strategy = RandomStrategy::new();

        for _ in 0..20 {
            let selected = strategy.select(&servers, "").unwrap();
            assert_eq!(selected.url(), servers[1].url());
        }
    }

    #[test]
    fn test_random_covers_pool() {
        let servers = make_servers(3);
        let strategy = RandomStrategy::new();

        let seen: HashSet<String> = (0..300)
            .map(|_| strategy.select(&servers, "").unwrap().url().to_string())
            .collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_factory_creates_fresh_instances() {
        let servers = make_servers(3);
        let a = StrategyContainer::create(Algorithm::RoundRobin);
        let b = StrategyContainer::create(Algorithm::RoundRobin);

        a.as_strategy().select(&servers, "").unwrap();
        let first_b = b.as_strategy().select(&servers, "").unwrap();
        assert_eq!(first_b.url(), servers[0].url());
    }

    #[test]
    fn test_strategy_names() {
        for algorithm in Algorithm::ALL {
            let container = StrategyContainer::create(algorithm);
            assert_eq!(container.algorithm(), algorithm);
            assert_eq!(container.as_strategy().name(), algorithm.as_str());
        }
    }
}

//! Per-server circuit state machines.

use super::config::CircuitBreakerConfig;
use crate::modules::load_balancer::Server;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// State of a single circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Traffic flows normally.
    #[default]
    Closed,
    /// Traffic is blocked.
    Open,
    /// Trial traffic is allowed to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Mutable state of one circuit. Guarded by its own mutex.
#[derive(Debug, Default)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    last_failure: Option<Instant>,
}

impl Circuit {
    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.consecutive_successes = 0;
    }
}

/// Point-in-time view of a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures.
    pub consecutive_failures: u32,
    /// Consecutive half-open successes.
    pub consecutive_successes: u32,
}

/// Circuit breaker keyed by server URL.
///
/// Transitions for one server are serialized by that server's mutex; calls
/// for different servers never wait on each other.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: DashMap<String, Arc<Mutex<Circuit>>>,
}

impl CircuitBreaker {
    /// Create a circuit breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: DashMap::new(),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn circuit(&self, key: &str) -> Arc<Mutex<Circuit>> {
        if let Some(circuit) = self.circuits.get(key) {
            return Arc::clone(circuit.value());
        }
        Arc::clone(self.circuits.entry(key.to_string()).or_default().value())
    }

    /// Whether a request may be sent to the server.
    ///
    /// An open circuit whose timeout has elapsed moves to half-open here and
    /// lets the request through.
    pub fn is_available(&self, server: &Server) -> bool {
        let circuit = self.circuit(server.url());
        let mut circuit = circuit.lock().expect("circuit lock poisoned");

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|opened| opened.elapsed())
                    .unwrap_or_default();
                if elapsed > self.config.timeout {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.consecutive_failures = 0;
                    circuit.consecutive_successes = 0;
                    info!(server = %server.url(), "Circuit half-open");
                    true
                } else {
                    false
                }
            },
        }
    }

    /// Record a successful request.
    pub fn record_success(&self, server: &Server) {
        let circuit = self.circuit(server.url());
        let mut circuit = circuit.lock().expect("circuit lock poisoned");

        match circuit.state {
            CircuitState::Closed => {
                let stale = circuit
                    .last_failure
                    .is_some_and(|at| at.elapsed() > self.config.reset_timeout);
                if stale && circuit.consecutive_failures > 0 {
                    debug!(server = %server.url(), "Forgetting stale failures");
                    circuit.consecutive_failures = 0;
                }
            },
            CircuitState::HalfOpen => {
                circuit.consecutive_successes += 1;
                circuit.consecutive_failures = 0;
                if circuit.consecutive_successes >= self.config.success_threshold {
                    circuit.state = CircuitState::Closed;
                    circuit.consecutive_successes = 0;
                    circuit.opened_at = None;
                    info!(server = %server.url(), "Circuit closed");
                }
            },
            CircuitState::Open => {},
        }
    }

    /// Record a failed request. Failures while open are ignored.
    pub fn record_failure(&self, server: &Server) {
        let circuit = self.circuit(server.url());
        let mut circuit = circuit.lock().expect("circuit lock poisoned");
        if circuit.state == CircuitState::Open {
            return;
        }
        let now = Instant::now();

        circuit.last_failure = Some(now);
        circuit.consecutive_failures += 1;
        circuit.consecutive_successes = 0;

        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    circuit.open(now);
                    warn!(
                        server = %server.url(),
                        failures = circuit.consecutive_failures,
                        "Circuit opened"
                    );
                }
            },
            CircuitState::HalfOpen => {
                circuit.open(now);
                warn!(server = %server.url(), "Circuit re-opened from half-open");
            },
            CircuitState::Open => {},
        }
    }

    /// Current state without triggering the open → half-open transition.
    #[must_use]
    pub fn state(&self, server: &Server) -> CircuitState {
        self.circuits
            .get(server.url())
            .map(|c| c.value().lock().expect("circuit lock poisoned").state)
            .unwrap_or_default()
    }

    /// Snapshot of one circuit.
    #[must_use]
    pub fn snapshot(&self, server: &Server) -> CircuitSnapshot {
        let circuit = self.circuit(server.url());
        let circuit = circuit.lock().expect("circuit lock poisoned");
        CircuitSnapshot {
            state: circuit.state,
            consecutive_failures: circuit.consecutive_failures,
            consecutive_successes: circuit.consecutive_successes,
        }
    }

    /// States of the given servers keyed by URL.
    #[must_use]
    pub fn states<'a>(
        &self,
        servers: impl IntoIterator<Item = &'a Arc<Server>>,
    ) -> BTreeMap<String, CircuitState> {
        servers
            .into_iter()
            .map(|s| (s.url().to_string(), self.state(s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(300),
        }
    }

    fn make_server() -> Server {
        Server::new("http://10.0.0.1:8080", 1, 100)
    }

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::new(test_config());
        let server = make_server();
        assert_eq!(breaker.state(&server), CircuitState::Closed);
        assert!(breaker.is_available(&server));
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(test_config());
        let server = make_server();

        breaker.record_failure(&server);
        breaker.record_failure(&server);
        assert!(breaker.is_available(&server));

        breaker.record_failure(&server);
        assert_eq!(breaker.state(&server), CircuitState::Open);
        assert!(!breaker.is_available(&server));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout() {
        let breaker = CircuitBreaker::new(test_config());
        let server = make_server();
        for _ in 0..3 {
            breaker.record_failure(&server);
        }

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!breaker.is_available(&server));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(breaker.state(&server), CircuitState::Open);
        assert!(breaker.is_available(&server));
        assert_eq!(breaker.state(&server), CircuitState::HalfOpen);

        let snapshot = breaker.snapshot(&server);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.consecutive_successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_successes() {
        let breaker = CircuitBreaker::new(test_config());
        let server = make_server();
        for _ in 0..3 {
            breaker.record_failure(&server);
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(breaker.is_available(&server));

        breaker.record_success(&server);
        assert_eq!(breaker.state(&server), CircuitState::HalfOpen);
        breaker.record_success(&server);
        assert_eq!(breaker.state(&server), CircuitState::Closed);
        assert!(breaker.is_available(&server));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(test_config());
        let server = make_server();
        for _ in 0..3 {
            breaker.record_failure(&server);
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(breaker.is_available(&server));

        breaker.record_success(&server);
        breaker.record_failure(&server);
        assert_eq!(breaker.state(&server), CircuitState::Open);
        assert!(!breaker.is_available(&server));

        // The open timer restarted at the re-open.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!breaker.is_available(&server));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(breaker.is_available(&server));
    }

    #[test]
    fn test_success_in_closed_keeps_recent_failures() {
        let breaker = CircuitBreaker::new(test_config());
        let server = make_server();

        breaker.record_failure(&server);
        breaker.record_failure(&server);
        breaker.record_success(&server);
        breaker.record_failure(&server);
        assert_eq!(breaker.state(&server), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_failures_are_forgotten() {
        let breaker = CircuitBreaker::new(test_config());
        let server = make_server();

        breaker.record_failure(&server);
        breaker.record_failure(&server);
        tokio::time::advance(Duration::from_secs(301)).await;
        breaker.record_success(&server);
        assert_eq!(breaker.snapshot(&server).consecutive_failures, 0);

        breaker.record_failure(&server);
        assert_eq!(breaker.state(&server), CircuitState::Closed);
    }

    #[test]
    fn test_servers_are_independent() {
        let breaker = CircuitBreaker::new(test_config());
        let a = make_server();
        let b = Server::new("http://10.0.0.2:8080", 1, 100);

        for _ in 0..3 {
            breaker.record_failure(&a);
        }
        assert!(!breaker.is_available(&a));
        assert!(breaker.is_available(&b));
    }

    #[test]
    fn test_concurrent_failures_open_once() {
        let breaker = Arc::new(CircuitBreaker::new(test_config()));
        let server = Arc::new(make_server());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                let server = Arc::clone(&server);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        breaker.record_failure(&server);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = breaker.snapshot(&server);
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.consecutive_failures, 3);
    }

    #[test]
    fn test_failures_while_open_leave_counters() {
        let breaker = CircuitBreaker::new(test_config());
        let server = make_server();
        for _ in 0..3 {
            breaker.record_failure(&server);
        }
        assert_eq!(breaker.state(&server), CircuitState::Open);

        let before = {
            let circuit = breaker.circuit(server.url());
            let circuit = circuit.lock().unwrap();
            (circuit.consecutive_failures, circuit.last_failure, circuit.opened_at)
        };
        for _ in 0..5 {
            breaker.record_failure(&server);
        }
        let circuit = breaker.circuit(server.url());
        let circuit = circuit.lock().unwrap();
        assert_eq!(
            (circuit.consecutive_failures, circuit.last_failure, circuit.opened_at),
            before
        );
    }

    #[test]
    fn test_states_and_serialization() {
        let breaker = CircuitBreaker::new(test_config());
        let servers = vec![
            Arc::new(make_server()),
            Arc::new(Server::new("http://10.0.0.2:8080", 1, 100)),
        ];
        for _ in 0..3 {
            breaker.record_failure(&servers[1]);
        }

        let states = breaker.states(&servers);
        assert_eq!(states["http://10.0.0.1:8080"], CircuitState::Closed);
        assert_eq!(states["http://10.0.0.2:8080"], CircuitState::Open);
        assert_eq!(
            serde_json::to_value(CircuitState::HalfOpen).unwrap(),
            "HALF_OPEN"
        );
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }
}

//! Active health checking of backend servers.
//!
//! The checker is the only writer of a server's health flag. Each server is
//! probed once on start and then on a fixed interval, in its own scheduled
//! task; a probe retries with linear backoff before it declares the server
//! unhealthy.

use super::config::HealthCheckConfig;
use super::error::{LoadBalancerError, LoadBalancerResult};
use super::server::Server;
use crate::modules::scheduler::TaskScheduler;
use http::Uri;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Boxed future returned by [`HealthProbe::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = LoadBalancerResult<()>> + Send + 'a>>;

/// A single liveness call against a server.
pub trait HealthProbe: Send + Sync {
    /// Probe the server once. `Ok` means healthy.
    fn probe<'a>(&'a self, server: &'a Server) -> ProbeFuture<'a>;
}

/// HTTP/1.1 `GET` against a fixed path; any 2xx status is healthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    path: String,
}

impl HttpProbe {
    /// Create a probe for `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    async fn check_http(&self, uri: &Uri, host: &str) -> Result<(), String> {
        let port = uri.port_u16().unwrap_or(80);
        let base = uri.path().trim_end_matches('/');

        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| format!("connection failed: {e}"))?;

        let request = format!(
            "GET {base}{} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n",
            self.path
        );
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| format!("failed to send request: {e}"))?;

        let mut reader = BufReader::new(stream);
        let mut status_line = String::new();
        reader
            .read_line(&mut status_line)
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        let code = status_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| format!("invalid HTTP response: {}", status_line.trim()))?;
        let status: u16 = code
            .parse()
            .map_err(|_| format!("invalid status code: {code}"))?;

        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(format!("unexpected status code: {status}"))
        }
    }
}

impl HealthProbe for HttpProbe {
    fn probe<'a>(&'a self, server: &'a Server) -> ProbeFuture<'a> {
        Box::pin(async move {
            let invalid = |message: String| LoadBalancerError::InvalidUpstream {
                url: server.url().to_string(),
                message,
            };
            let uri: Uri = server.url().parse().map_err(|e| invalid(format!("{e}")))?;
            let host = uri.host().ok_or_else(|| invalid("missing host".to_string()))?;

            self.check_http(&uri, host)
                .await
                .map_err(|e| LoadBalancerError::HealthCheckFailed(server.url().to_string(), e))
        })
    }
}

/// Health checker statistics.
#[derive(Debug, Default)]
pub struct HealthStats {
    /// Completed probes (after retries).
    pub checks: AtomicU64,
    /// Probes that ended unhealthy.
    pub failures: AtomicU64,
}

/// Probes servers and maintains their health flags.
pub struct HealthChecker {
    config: HealthCheckConfig,
    probe: Arc<dyn HealthProbe>,
    servers: RwLock<Vec<Arc<Server>>>,
    stats: HealthStats,
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("config", &self.config)
            .field("servers", &self.server_count())
            .finish()
    }
}

impl HealthChecker {
    /// Create a checker with an explicit probe.
    #[must_use]
    pub fn new(config: HealthCheckConfig, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            config,
            probe,
            servers: RwLock::new(Vec::new()),
            stats: HealthStats::default(),
        }
    }

    /// Create a checker probing `config.path` over HTTP.
    #[must_use]
    pub fn http(config: HealthCheckConfig) -> Self {
        let probe = Arc::new(HttpProbe::new(config.path.clone()));
        Self::new(config, probe)
    }

    /// Check if health checks are enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the statistics.
    #[must_use]
    pub fn stats(&self) -> &HealthStats {
        &self.stats
    }

    /// Add a server to the set probed on start.
    pub fn register(&self, server: Arc<Server>) {
        let mut servers = self.servers.write().expect("servers lock poisoned");
        if !servers.iter().any(|s| Arc::ptr_eq(s, &server)) {
            servers.push(server);
        }
    }

    /// Number of registered servers.
    #[must_use]
    pub fn server_count(&self) -> usize {
        self.servers.read().expect("servers lock poisoned").len()
    }

    /// Schedule probing for every registered server.
    ///
    /// With health checks disabled every server is marked healthy once and
    /// nothing is scheduled.
    pub fn start(self: &Arc<Self>, scheduler: &TaskScheduler) {
        let servers = self.servers.read().expect("servers lock poisoned").clone();

        if !self.config.enabled {
            for server in &servers {
                server.set_healthy(true);
            }
            info!(servers = servers.len(), "Health checks disabled, all servers healthy");
            return;
        }

        info!(
            servers = servers.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting health checks"
        );

        for server in servers {
            let checker = Arc::clone(self);
            let name = format!("health:{}", server.url());
            scheduler.spawn_periodic(name, self.config.interval, move || {
                let checker = Arc::clone(&checker);
                let server = Arc::clone(&server);
                async move {
                    checker.check_server(&server).await;
                }
            });
        }
    }

    /// Probe one server in the background without waiting for the result.
    pub fn check_now(self: &Arc<Self>, server: Arc<Server>) {
        let checker = Arc::clone(self);
        tokio::spawn(async move {
            checker.check_server(&server).await;
        });
    }

    /// Probe a server with retries and record the outcome. Returns the new
    /// health flag.
    pub async fn check_server(&self, server: &Server) -> bool {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let started = Instant::now();
            let result = match timeout(self.config.timeout, self.probe.probe(server)).await {
                Ok(result) => result,
                Err(_) => Err(LoadBalancerError::HealthCheckFailed(
                    server.url().to_string(),
                    format!("timed out after {}ms", self.config.timeout.as_millis()),
                )),
            };

            match result {
                Ok(()) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    server.update_response_time(elapsed_ms);
                    server.mark_health_checked();
                    self.stats.checks.fetch_add(1, Ordering::Relaxed);
                    self.apply(server, true, None);
                    return true;
                },
                Err(e) => {
                    debug!(server = %server.url(), attempt, error = %e, "Health probe attempt failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                },
            }
        }

        server.record_health_failure();
        server.mark_health_checked();
        self.stats.checks.fetch_add(1, Ordering::Relaxed);
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        self.apply(server, false, Some(&last_error));
        false
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.retry_backoff * attempt
    }

    /// Set the flag, logging only actual flips.
    fn apply(&self, server: &Server, healthy: bool, error: Option<&str>) {
        let was_healthy = server.set_healthy(healthy);
        match (was_healthy, healthy) {
            (false, true) => info!(server = %server.url(), "Server is healthy again"),
            (true, false) => warn!(
                server = %server.url(),
                error = error.unwrap_or_default(),
                "Server marked unhealthy"
            ),
            _ => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Probe that fails a fixed number of times before succeeding.
    struct ScriptedProbe {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(times),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl HealthProbe for ScriptedProbe {
        fn probe<'a>(&'a self, server: &'a Server) -> ProbeFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    Err(LoadBalancerError::HealthCheckFailed(
                        server.url().to_string(),
                        "refused".to_string(),
                    ))
                } else {
                    Ok(())
                }
            })
        }
    }

    struct HangingProbe;

    impl HealthProbe for HangingProbe {
        fn probe<'a>(&'a self, _server: &'a Server) -> ProbeFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    fn test_config() -> HealthCheckConfig {
        HealthCheckConfig {
            enabled: true,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
            path: "/actuator/health".to_string(),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }

    fn make_server() -> Arc<Server> {
        Arc::new(Server::new("http://10.0.0.1:8080", 1, 100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_retries() {
        let probe = Arc::new(ScriptedProbe::failing(2));
        let checker = HealthChecker::new(test_config(), probe.clone());
        let server = make_server();

        let started = Instant::now();
        assert!(checker.check_server(&server).await);
        assert!(server.is_healthy());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        // Backoff of 100ms then 200ms.
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(server.stats().failed_health_check_count(), 0);
        assert!(server.last_health_check().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_unhealthy_after_retries() {
        let probe = Arc::new(ScriptedProbe::failing(10));
        let checker = HealthChecker::new(test_config(), probe.clone());
        let server = make_server();

        assert!(!checker.check_server(&server).await);
        assert!(!server.is_healthy());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert_eq!(server.stats().failed_health_check_count(), 1);
        assert_eq!(checker.stats().failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_counts_as_failure() {
        let mut config = test_config();
        config.max_retries = 1;
        let checker = HealthChecker::new(config, Arc::new(HangingProbe));
        let server = make_server();

        assert!(!checker.check_server(&server).await);
        assert!(!server.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_probes_periodically() {
        let probe = Arc::new(ScriptedProbe::failing(0));
        let checker = Arc::new(HealthChecker::new(test_config(), probe.clone()));
        checker.register(make_server());
        checker.register(Arc::new(Server::new("http://10.0.0.2:8080", 1, 100)));

        let scheduler = TaskScheduler::new();
        checker.start(&scheduler);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_disabled_marks_all_healthy() {
        let mut config = test_config();
        config.enabled = false;
        let probe = Arc::new(ScriptedProbe::failing(0));
        let checker = Arc::new(HealthChecker::new(config, probe.clone()));

        let server = make_server();
        server.set_healthy(false);
        checker.register(Arc::clone(&server));

        let scheduler = TaskScheduler::new();
        checker.start(&scheduler);

        assert!(server.is_healthy());
        assert_eq!(scheduler.active_tasks(), 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_register_deduplicates() {
        let checker = HealthChecker::http(test_config());
        let server = make_server();
        checker.register(Arc::clone(&server));
        checker.register(server);
        assert_eq!(checker.server_count(), 1);
    }

    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!("{status_line}\r\nContent-Length: 0\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_http_probe_success() {
        let url = serve_once("HTTP/1.1 200 OK").await;
        let server = Server::new(url, 1, 100);
        let probe = HttpProbe::new("/actuator/health");
        assert!(probe.probe(&server).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_probe_error_status() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let server = Server::new(url, 1, 100);
        let probe = HttpProbe::new("/actuator/health");
        let err = probe.probe(&server).await.unwrap_err();
        assert!(err.to_string().contains("unexpected status code: 503"));
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = Server::new(format!("http://{addr}"), 1, 100);
        let probe = HttpProbe::new("/actuator/health");
        assert!(probe.probe(&server).await.is_err());
    }
}

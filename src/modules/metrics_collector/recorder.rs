//! Prometheus registry for load balancer metrics.

use super::error::MetricsResult;
use super::sink::MetricsSink;
use crate::modules::deployment::DeploymentManager;
use crate::modules::load_balancer::{Server, ServiceRegistry};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

const SUCCESS: &str = "success";
const ERROR: &str = "error";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    service: String,
    outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ServiceLabels {
    service: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ServerLabels {
    service: String,
    server: String,
}

type FloatGauge = Gauge<f64, AtomicU64>;
type HistogramFamily = Family<ServiceLabels, Histogram, fn() -> Histogram>;

fn duration_histogram() -> Histogram {
    // 1ms .. ~16s
    Histogram::new(exponential_buckets(1.0, 2.0, 15))
}

/// Load balancer metrics backed by a `prometheus-client` registry.
#[derive(Debug)]
pub struct LoadBalancerMetrics {
    registry: Registry,
    requests: Family<RequestLabels, Counter>,
    durations: HistogramFamily,
    active_connections: Family<ServerLabels, Gauge>,
    healthy: Family<ServerLabels, Gauge>,
    server_requests: Family<ServerLabels, Gauge>,
    server_failures: Family<ServerLabels, Gauge>,
    response_time: Family<ServerLabels, FloatGauge>,
    success_rate: Family<ServerLabels, FloatGauge>,
}

impl Default for LoadBalancerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancerMetrics {
    /// Create and register every metric.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests = Family::<RequestLabels, Counter>::default();
        registry.register("lb_requests", "Proxied requests by outcome", requests.clone());

        let durations = HistogramFamily::new_with_constructor(duration_histogram);
        registry.register(
            "lb_request_duration_milliseconds",
            "Proxied request duration in milliseconds",
            durations.clone(),
        );

        let active_connections = Family::<ServerLabels, Gauge>::default();
        registry.register(
            "lb_server_active_connections",
            "In-flight requests per server",
            active_connections.clone(),
        );

        let healthy = Family::<ServerLabels, Gauge>::default();
        registry.register("lb_server_healthy", "1 if the server is healthy", healthy.clone());

        let server_requests = Family::<ServerLabels, Gauge>::default();
        registry.register(
            "lb_server_requests_total",
            "Requests forwarded to the server",
            server_requests.clone(),
        );

        let server_failures = Family::<ServerLabels, Gauge>::default();
        registry.register(
            "lb_server_failed_requests",
            "Failed requests forwarded to the server",
            server_failures.clone(),
        );

        let response_time = Family::<ServerLabels, FloatGauge>::default();
        registry.register(
            "lb_server_response_time_milliseconds",
            "Smoothed server response time",
            response_time.clone(),
        );

        let success_rate = Family::<ServerLabels, FloatGauge>::default();
        registry.register(
            "lb_server_success_rate",
            "Percentage of successful requests",
            success_rate.clone(),
        );

        Self {
            registry,
            requests,
            durations,
            active_connections,
            healthy,
            server_requests,
            server_failures,
            response_time,
            success_rate,
        }
    }

    fn record(&self, service: &str, outcome: &str, duration_ms: f64) {
        self.requests
            .get_or_create(&RequestLabels {
                service: service.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.durations
            .get_or_create(&ServiceLabels {
                service: service.to_string(),
            })
            .observe(duration_ms);
    }

    /// Requests recorded for a service with the given outcome.
    #[must_use]
    pub fn request_count(&self, service: &str, success: bool) -> u64 {
        let outcome = if success { SUCCESS } else { ERROR };
        self.requests
            .get_or_create(&RequestLabels {
                service: service.to_string(),
                outcome: outcome.to_string(),
            })
            .get()
    }

    /// Copy the current state of `servers` into the per-server gauges.
    pub fn refresh_servers(&self, service: &str, servers: &[Arc<Server>]) {
        for server in servers {
            let labels = ServerLabels {
                service: service.to_string(),
                server: server.url().to_string(),
            };
            let stats = server.stats();
            self.active_connections
                .get_or_create(&labels)
                .set(stats.active_connection_count() as i64);
            self.healthy
                .get_or_create(&labels)
                .set(i64::from(server.is_healthy()));
            self.server_requests
                .get_or_create(&labels)
                .set(stats.total_request_count() as i64);
            self.server_failures
                .get_or_create(&labels)
                .set(stats.failed_request_count() as i64);
            self.response_time
                .get_or_create(&labels)
                .set(stats.average_response_time());
            self.success_rate
                .get_or_create(&labels)
                .set(server.success_rate());
        }
    }

    /// Refresh gauges for every registered service, green servers included.
    pub fn refresh(&self, registry: &ServiceRegistry, deployments: &DeploymentManager) {
        for name in registry.service_names() {
            let servers = deployments.servers_with(&name, registry.servers(&name));
            self.refresh_servers(&name, &servers);
        }
    }

    /// Encode the registry in Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> MetricsResult<String> {
        let mut output = String::new();
        encode(&mut output, &self.registry)?;
        Ok(output)
    }
}

impl MetricsSink for LoadBalancerMetrics {
    fn record_success(&self, service: &str, duration_ms: f64) {
        self.record(service, SUCCESS, duration_ms);
    }

    fn record_error(&self, service: &str, duration_ms: f64) {
        self.record(service, ERROR, duration_ms);
    }
}

//! Metrics Collector Module
//!
//! Prometheus metrics for the balancer: request outcome counters and
//! latency histograms recorded by the request pipeline, plus per-server
//! gauges refreshed from the service registry on every scrape.

mod config;
mod error;
mod recorder;
mod sink;

pub use config::MetricsConfig;
pub use error::{MetricsError, MetricsResult};
pub use recorder::LoadBalancerMetrics;
pub use sink::{MetricsSink, NoopMetrics};

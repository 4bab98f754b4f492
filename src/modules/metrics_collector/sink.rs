//! Request outcome sink.

/// Receives the outcome of every proxied request.
pub trait MetricsSink: Send + Sync {
    /// A request was relayed from the backend.
    fn record_success(&self, service: &str, duration_ms: f64);

    /// A request failed to reach the backend or failed in transit.
    fn record_error(&self, service: &str, duration_ms: f64);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_success(&self, _service: &str, _duration_ms: f64) {}

    fn record_error(&self, _service: &str, _duration_ms: f64) {}
}

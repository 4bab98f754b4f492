//! The core Module Contract trait.

use super::{ModuleConfig, ModuleError, ModuleManifest, ModuleResult, ModuleStatus};
use std::collections::HashMap;

/// Metrics snapshot reported by a module.
#[derive(Debug, Clone, Default)]
pub struct MetricsPayload {
    /// Counter metrics (monotonically increasing).
    pub counters: HashMap<String, u64>,

    /// Gauge metrics (can go up and down).
    pub gauges: HashMap<String, f64>,
}

impl MetricsPayload {
    /// Creates a new empty metrics payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a counter metric.
    pub fn counter(&mut self, name: impl Into<String>, value: u64) {
        self.counters.insert(name.into(), value);
    }

    /// Adds a gauge metric.
    pub fn gauge(&mut self, name: impl Into<String>, value: f64) {
        self.gauges.insert(name.into(), value);
    }

    /// Formats metrics in Prometheus text format, sorted by name.
    #[must_use]
    pub fn to_prometheus(&self, prefix: &str) -> String {
        let mut lines: Vec<String> = self
            .counters
            .iter()
            .map(|(name, value)| format!("{prefix}_{name} {value}"))
            .chain(
                self.gauges
                    .iter()
                    .map(|(name, value)| format!("{prefix}_{name} {value}")),
            )
            .collect();
        lines.sort();

        let mut output = lines.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        output
    }
}

/// Lifecycle contract shared by long-running components.
///
/// # Lifecycle
///
/// 1. `manifest()` - Describe identity and capabilities
/// 2. `init()` - Parse configuration and build internal state
/// 3. `start()` - Begin background work
/// 4. `status()` / `metrics()` - Ongoing monitoring
/// 5. `stop()` - Release background work
pub trait ModuleContract: Send + Sync {
    /// Returns the module's manifest describing its identity and capabilities.
    fn manifest(&self) -> ModuleManifest;

    /// Initializes the module with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if the configuration is invalid.
    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()>;

    /// Starts the module's processing.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::InvalidState` if called before `init()`.
    fn start(&mut self) -> ModuleResult<()>;

    /// Stops the module gracefully.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::StopFailed` if shutdown fails.
    fn stop(&mut self) -> ModuleResult<()>;

    /// Reloads the module's configuration.
    ///
    /// # Errors
    ///
    /// The default implementation always fails; hot reload is opt-in.
    fn reload(&mut self, _config: ModuleConfig) -> ModuleResult<()> {
        Err(ModuleError::ConfigError(
            "hot reload not supported".to_string(),
        ))
    }

    /// Returns the current status of the module.
    fn status(&self) -> ModuleStatus;

    /// Returns the current metrics from the module.
    fn metrics(&self) -> MetricsPayload;

    /// Liveness check; `true` while the module is operational.
    fn heartbeat(&self) -> bool {
        self.status().is_operational()
    }
}

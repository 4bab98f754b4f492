//! # Module Contract
//!
//! Uniform lifecycle interface for the long-running parts of the balancer.
//! A module is described by a manifest, initialized from TOML, started,
//! monitored through status/metrics, and stopped.

mod config;
mod contract;
mod error;
mod manifest;
mod status;

pub use config::ModuleConfig;
pub use contract::{MetricsPayload, ModuleContract};
pub use error::{ModuleError, ModuleResult};
pub use manifest::{Capability, ModuleManifest, ModuleManifestBuilder, SemVer};
pub use status::ModuleStatus;

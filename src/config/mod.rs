//! # Configuration System
//!
//! TOML-based configuration for the balancer: parsing, defaults and
//! validation.
//!
//! ## Example Configuration
//!
//! ```toml
//! [listener]
//! bind_address = "0.0.0.0"
//! port = 8080
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [load_balancer]
//! algorithm = "round-robin"
//!
//! [load_balancer.rate_limit]
//! enabled = true
//! max_requests = 100
//! window = "60s"
//!
//! [[services]]
//! name = "orders"
//! upstreams = [
//!     { url = "http://10.0.0.1:8080" },
//!     { url = "http://10.0.0.2:8080", weight = 3 },
//! ]
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{BalancerConfig, LogFormat, LogLevel, LoggingConfig};
pub use validation::{
    BasicValidator, UpstreamValidator, ValidationError, ValidationResult, ValidationSeverity,
    Validator,
};

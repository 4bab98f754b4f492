//! # Load Balancer Module
//!
//! Server model, selection strategies, the service registry and active
//! health checking.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   ServiceRegistry    │
//! │                      │      ┌─────────┐
//! │  service ─▶ Strategy │─────▶│ Server1 │
//! │          ─▶ Servers  │      └─────────┘
//! │                      │      ┌─────────┐
//! └──────────────────────┘─────▶│ Server2 │
//!            ▲                  └─────────┘
//!   ┌────────┴────────┐              ▲
//!   │  HealthChecker  │──────────────┘
//!   └─────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod registry;
pub mod server;
pub mod strategy;

pub use config::{Algorithm, HealthCheckConfig, LoadBalancerConfig, ServiceConfig, UpstreamConfig};
pub use error::{LoadBalancerError, LoadBalancerResult};
pub use health::{HealthChecker, HealthProbe, HttpProbe, ProbeFuture};
pub use registry::{ServiceDetails, ServiceHandle, ServiceRegistry, ServiceStatus};
pub use server::{Server, ServerSnapshot, ServerStats};
pub use strategy::{
    IpHashStrategy, LeastConnectionsStrategy, RandomStrategy, RoundRobinStrategy, Strategy,
    StrategyContainer, WeightedRoundRobinStrategy,
};

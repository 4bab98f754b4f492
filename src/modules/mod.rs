//! # Balancer Modules
//!
//! Building blocks of the balancer, wired together by
//! [`crate::gateway::Gateway`].
//!
//! ## Available Modules
//!
//! - [`load_balancer`] - Servers, selection strategies, registry and health checks
//! - [`circuit_breaker`] - Per-server circuit state machines
//! - [`rate_limiting`] - Per-client token bucket and sliding window limits
//! - [`sticky_session`] - Session to server affinity
//! - [`deployment`] - Blue-green environments and traffic shifting
//! - [`scheduler`] - Periodic and deferred background tasks
//! - [`metrics_collector`] - Prometheus-compatible metrics
//! - [`proxy`] - Request pipeline, forwarding, admin API and listener

pub mod circuit_breaker;
pub mod deployment;
pub mod load_balancer;
pub mod metrics_collector;
pub mod proxy;
pub mod rate_limiting;
pub mod scheduler;
pub mod sticky_session;

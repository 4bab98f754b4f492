//! # R0N Balancer
//!
//! A reverse-proxy load balancer. Requests addressed as
//! `/{service}/{path}` are routed to one of the service's upstreams.
//!
//! ## Features
//!
//! - Five selection strategies (round robin, least connections, IP hash,
//!   weighted round robin, random)
//! - Active health checks with retries
//! - Per-server circuit breaking
//! - Per-client rate limiting (token bucket or sliding window)
//! - Cookie-based sticky sessions
//! - Blue-green deployments with instant, gradual and scheduled switches
//! - Admin API and Prometheus-compatible metrics
//!
//! ## Architecture
//!
//! The [`gateway::Gateway`] builds every component from a
//! [`config::BalancerConfig`] and implements [`module::ModuleContract`] for
//! uniform lifecycle management. Inbound traffic flows through the
//! [`modules::proxy::Dispatcher`] into the
//! [`modules::proxy::RequestPipeline`].

pub mod config;
pub mod gateway;
pub mod module;
pub mod modules;

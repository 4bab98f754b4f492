//! # Proxy Module
//!
//! The HTTP surface of the balancer:
//!
//! ```text
//!   TcpListener ─► Dispatcher ─┬─► /metrics      LoadBalancerMetrics
//!                              ├─► /admin/...    AdminApi
//!                              └─► /{service}/.. RequestPipeline ─► Forwarder ─► backend
//! ```
//!
//! The pipeline works on buffered [`ProxyRequest`]/[`ProxyResponse`] values
//! so it can be driven without a socket; [`Forwarder`] is the seam for the
//! outbound call.

mod admin;
mod config;
mod error;
mod forward;
mod headers;
mod pipeline;
mod request;
mod server;

pub use admin::{AdminApi, Features};
pub use config::{AdminConfig, ListenerConfig, ProxyConfig};
pub use error::{ProxyError, ProxyResult};
pub use forward::{ForwardFuture, Forwarder, HttpForwarder, OutboundRequest};
pub use headers::{backend_path, client_ip, cookie_value, forwarded_host, session_cookie, split_service};
pub use pipeline::RequestPipeline;
pub use request::{ProxyRequest, ProxyResponse};
pub use server::{serve, Dispatcher};

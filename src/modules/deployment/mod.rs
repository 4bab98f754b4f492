//! # Blue-Green Deployment Module
//!
//! Each service with a green pool carries two environments:
//!
//! ```text
//!   blue  (serving)  ──┐
//!                      ├──► active_servers() ──► strategy
//!   green (candidate) ─┘
//! ```
//!
//! Traffic moves between them with an instant switch, a gradual ramp of
//! evenly spaced steps, or a switch scheduled for a wall-clock time. Any
//! switch or rollback supersedes steps still pending from an earlier ramp.

mod environment;
mod error;
mod manager;

pub use environment::{DeploymentStatus, Environment, MIXED_POOL_SIZE};
pub use error::{DeploymentError, DeploymentResult};
pub use manager::DeploymentManager;

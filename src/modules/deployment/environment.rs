//! Blue and green pools of one service.

use crate::modules::load_balancer::Server;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Number of slots in a mixed pool.
pub const MIXED_POOL_SIZE: usize = 10;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    /// Currently serving version.
    #[default]
    Blue,
    /// Newly deployed version.
    Green,
}

impl Environment {
    /// The other environment.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Blue => Self::Green,
            Self::Green => Self::Blue,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blue => write!(f, "BLUE"),
            Self::Green => write!(f, "GREEN"),
        }
    }
}

/// Point-in-time deployment state of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStatus {
    /// Service name.
    pub service: String,
    /// Environment that owns the traffic.
    pub active_environment: Environment,
    /// Share of traffic sent to green, 0 to 100.
    pub green_traffic_percentage: u8,
    /// Blue server URLs.
    pub blue_servers: Vec<String>,
    /// Green server URLs.
    pub green_servers: Vec<String>,
    /// Ramp steps or scheduled switches still to fire.
    pub pending_steps: usize,
}

#[derive(Debug)]
pub(crate) struct DeploymentEnvironment {
    pub(crate) blue: Vec<Arc<Server>>,
    pub(crate) green: Vec<Arc<Server>>,
    pub(crate) active: Environment,
    pub(crate) green_percentage: u8,
    /// Bumped whenever an operator action supersedes pending steps.
    pub(crate) generation: u64,
    pub(crate) pending_steps: usize,
}

impl DeploymentEnvironment {
    pub(crate) fn new(blue: Vec<Arc<Server>>, green: Vec<Arc<Server>>) -> Self {
        Self {
            blue,
            green,
            active: Environment::Blue,
            green_percentage: 0,
            generation: 0,
            pending_steps: 0,
        }
    }

    pub(crate) fn switch_instant(&mut self) {
        self.active = self.active.other();
        self.green_percentage = match self.active {
            Environment::Green => 100,
            Environment::Blue => 0,
        };
    }

    /// Start a new generation, dropping any pending steps.
    pub(crate) fn supersede(&mut self) -> u64 {
        self.generation += 1;
        self.pending_steps = 0;
        self.generation
    }

    /// Set the share of the inactive side.
    pub(crate) fn set_inactive_share(&mut self, percentage: u8) {
        let percentage = percentage.min(100);
        self.green_percentage = match self.active {
            Environment::Blue => percentage,
            Environment::Green => 100 - percentage,
        };
    }

    pub(crate) fn active_servers(&self) -> Vec<Arc<Server>> {
        match self.green_percentage {
            0 => self.blue.clone(),
            100 => self.green.clone(),
            pct => {
                let green_slots = (f64::from(pct) * MIXED_POOL_SIZE as f64 / 100.0).round() as usize;
                let blue_slots = MIXED_POOL_SIZE - green_slots;
                cycle(&self.blue, blue_slots)
                    .chain(cycle(&self.green, green_slots))
                    .cloned()
                    .collect()
            },
        }
    }

    pub(crate) fn status(&self, service: &str) -> DeploymentStatus {
        DeploymentStatus {
            service: service.to_string(),
            active_environment: self.active,
            green_traffic_percentage: self.green_percentage,
            blue_servers: self.blue.iter().map(|s| s.url().to_string()).collect(),
            green_servers: self.green.iter().map(|s| s.url().to_string()).collect(),
            pending_steps: self.pending_steps,
        }
    }
}

/// `slots` entries taken from `servers` with wraparound; nothing if empty.
fn cycle(servers: &[Arc<Server>], slots: usize) -> impl Iterator<Item = &Arc<Server>> {
    let take = if servers.is_empty() { 0 } else { slots };
    servers.iter().cycle().take(take)
}

//! Blue-green deployment manager.

use super::environment::{DeploymentEnvironment, DeploymentStatus, Environment};
use super::error::{DeploymentError, DeploymentResult};
use crate::modules::load_balancer::Server;
use crate::modules::scheduler::TaskScheduler;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

type SharedEnvironment = Arc<Mutex<DeploymentEnvironment>>;

/// Delay between the last ramp step and the closing instant switch.
const FINAL_SWITCH_GRACE: Duration = Duration::from_secs(1);

/// Manages blue and green environments per service.
///
/// Deferred steps run on the manager's own scheduler and are aborted when
/// the manager is dropped.
#[derive(Debug, Default)]
pub struct DeploymentManager {
    environments: DashMap<String, SharedEnvironment>,
    scheduler: TaskScheduler,
}

impl DeploymentManager {
    /// Create a manager with no environments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or replace) the environments of a service. Blue starts active.
    pub fn define_environments(
        &self,
        service: &str,
        blue: Vec<Arc<Server>>,
        green: Vec<Arc<Server>>,
    ) {
        info!(
            service = %service,
            blue = blue.len(),
            green = green.len(),
            "Defined deployment environments"
        );
        self.environments.insert(
            service.to_string(),
            Arc::new(Mutex::new(DeploymentEnvironment::new(blue, green))),
        );
    }

    /// Whether the service has environments.
    #[must_use]
    pub fn has_environment(&self, service: &str) -> bool {
        self.environments.contains_key(service)
    }

    /// Services with environments, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.environments.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn environment(&self, service: &str) -> DeploymentResult<SharedEnvironment> {
        self.environments
            .get(service)
            .map(|env| Arc::clone(env.value()))
            .ok_or_else(|| DeploymentError::UnknownService(service.to_string()))
    }

    /// Servers that should receive traffic right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the service has no environments.
    pub fn active_servers(&self, service: &str) -> DeploymentResult<Vec<Arc<Server>>> {
        let env = self.environment(service)?;
        let env = env.lock().expect("deployment lock poisoned");
        Ok(env.active_servers())
    }

    /// Every server of the service, blue first then green, without
    /// duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if the service has no environments.
    pub fn all_servers(&self, service: &str) -> DeploymentResult<Vec<Arc<Server>>> {
        let env = self.environment(service)?;
        let env = env.lock().expect("deployment lock poisoned");
        let mut servers: Vec<Arc<Server>> = Vec::with_capacity(env.blue.len() + env.green.len());
        for server in env.blue.iter().chain(&env.green) {
            if !servers.iter().any(|s| Arc::ptr_eq(s, server)) {
                servers.push(Arc::clone(server));
            }
        }
        Ok(servers)
    }

    /// Registered servers of `service` plus any environment servers not
    /// among them.
    #[must_use]
    pub fn servers_with(&self, service: &str, mut registered: Vec<Arc<Server>>) -> Vec<Arc<Server>> {
        for server in self.all_servers(service).unwrap_or_default() {
            if !registered.iter().any(|s| Arc::ptr_eq(s, &server)) {
                registered.push(server);
            }
        }
        registered
    }

    /// Flip the active environment immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the service has no environments.
    pub fn switch_instant(&self, service: &str) -> DeploymentResult<Environment> {
        let env = self.environment(service)?;
        let mut env = env.lock().expect("deployment lock poisoned");
        env.supersede();
        env.switch_instant();
        info!(service = %service, active = %env.active, "Instant switch completed");
        Ok(env.active)
    }

    /// Move traffic to the inactive environment in `steps` even steps over
    /// `duration`, then switch.
    ///
    /// Step `i` fires at `i * duration / steps` and gives the inactive side
    /// `i * (100 / steps)` percent. The closing switch fires one second
    /// after `duration`.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unknown, `steps` is not in
    /// `1..=100`, or `duration` is too large to schedule.
    pub fn switch_gradual(&self, service: &str, duration: Duration, steps: u32) -> DeploymentResult<()> {
        if !(1..=100).contains(&steps) {
            return Err(DeploymentError::InvalidSteps(steps));
        }
        let final_delay = duration
            .checked_add(FINAL_SWITCH_GRACE)
            .filter(|d| Instant::now().checked_add(*d).is_some())
            .ok_or(DeploymentError::InvalidDuration(duration))?;
        let shared = self.environment(service)?;
        let generation = {
            let mut env = shared.lock().expect("deployment lock poisoned");
            let generation = env.supersede();
            env.pending_steps = steps as usize + 1;
            generation
        };

        info!(
            service = %service,
            steps,
            duration_secs = duration.as_secs(),
            "Starting gradual switch"
        );

        let step_delay = duration / steps;
        let increment = 100 / steps;
        for i in 1..=steps {
            let percentage = (i * increment).min(100) as u8;
            let env = Arc::clone(&shared);
            let name = service.to_string();
            self.scheduler.spawn_after(
                format!("deployment-{service}-step-{i}"),
                step_delay * i,
                async move {
                    let mut env = env.lock().expect("deployment lock poisoned");
                    if env.generation != generation {
                        return;
                    }
                    env.pending_steps = env.pending_steps.saturating_sub(1);
                    env.set_inactive_share(percentage);
                    info!(
                        service = %name,
                        green_percentage = env.green_percentage,
                        "Gradual switch progress"
                    );
                },
            );
        }

        let env = Arc::clone(&shared);
        let name = service.to_string();
        self.scheduler.spawn_after(
            format!("deployment-{service}-final"),
            final_delay,
            async move {
                let mut env = env.lock().expect("deployment lock poisoned");
                if env.generation != generation {
                    return;
                }
                env.pending_steps = 0;
                env.switch_instant();
                info!(service = %name, active = %env.active, "Gradual switch completed");
            },
        );

        Ok(())
    }

    /// Switch once at `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unknown or `at` is not in the future.
    pub fn switch_scheduled(&self, service: &str, at: DateTime<Utc>) -> DeploymentResult<()> {
        let shared = self.environment(service)?;
        let delay = (at - Utc::now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or(DeploymentError::ScheduleInPast(at))?;

        let generation = {
            let mut env = shared.lock().expect("deployment lock poisoned");
            let generation = env.supersede();
            env.pending_steps = 1;
            generation
        };

        info!(service = %service, at = %at, "Scheduled switch");

        let name = service.to_string();
        self.scheduler
            .spawn_after(format!("deployment-{service}-scheduled"), delay, async move {
                let mut env = shared.lock().expect("deployment lock poisoned");
                if env.generation != generation {
                    return;
                }
                env.pending_steps = 0;
                env.switch_instant();
                info!(service = %name, active = %env.active, "Scheduled switch executed");
            });

        Ok(())
    }

    /// Switch back to blue. Does nothing when blue is already active.
    ///
    /// # Errors
    ///
    /// Returns an error if the service has no environments.
    pub fn rollback(&self, service: &str) -> DeploymentResult<Environment> {
        let env = self.environment(service)?;
        let mut env = env.lock().expect("deployment lock poisoned");
        if env.active == Environment::Blue {
            warn!(service = %service, "Already on blue environment, nothing to roll back");
            return Ok(env.active);
        }
        env.supersede();
        env.switch_instant();
        info!(service = %service, "Rolled back to blue");
        Ok(env.active)
    }

    /// Deployment state of a service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service has no environments.
    pub fn status(&self, service: &str) -> DeploymentResult<DeploymentStatus> {
        let env = self.environment(service)?;
        let env = env.lock().expect("deployment lock poisoned");
        Ok(env.status(service))
    }

    /// Abort every pending step.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn manager() -> DeploymentManager {
        let manager = DeploymentManager::new();
        manager.define_environments(
            "orders",
            vec![Arc::new(Server::new("http://blue:8080", 1, 100))],
            vec![Arc::new(Server::new("http://green:8080", 1, 100))],
        );
        manager
    }

    fn green_share(manager: &DeploymentManager) -> u8 {
        manager.status("orders").unwrap().green_traffic_percentage
    }

    #[test]
    fn test_unknown_service() {
        let manager = DeploymentManager::new();
        assert!(matches!(
            manager.active_servers("missing"),
            Err(DeploymentError::UnknownService(_))
        ));
        assert!(manager.switch_instant("missing").is_err());
        assert!(manager.rollback("missing").is_err());
    }

    #[test]
    fn test_initial_status() {
        let manager = manager();
        let status = manager.status("orders").unwrap();
        assert_eq!(status.active_environment, Environment::Blue);
        assert_eq!(status.green_traffic_percentage, 0);
        assert_eq!(status.blue_servers, vec!["http://blue:8080"]);
        assert_eq!(status.pending_steps, 0);
        assert_eq!(manager.services(), vec!["orders"]);
    }

    #[test]
    fn test_instant_switch_and_rollback() {
        let manager = manager();
        assert_eq!(manager.switch_instant("orders").unwrap(), Environment::Green);
        assert_eq!(manager.active_servers("orders").unwrap()[0].url(), "http://green:8080");

        assert_eq!(manager.rollback("orders").unwrap(), Environment::Blue);
        assert_eq!(manager.active_servers("orders").unwrap()[0].url(), "http://blue:8080");

        // Already blue: no-op.
        assert_eq!(manager.rollback("orders").unwrap(), Environment::Blue);
        assert_eq!(green_share(&manager), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gradual_switch() {
        let manager = manager();
        manager
            .switch_gradual("orders", Duration::from_secs(10), 4)
            .unwrap();
        assert_eq!(manager.status("orders").unwrap().pending_steps, 5);

        sleep(Duration::from_millis(2_600)).await;
        assert_eq!(green_share(&manager), 25);
        assert_eq!(manager.active_servers("orders").unwrap().len(), 10);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(green_share(&manager), 75);

        sleep(Duration::from_secs(3)).await;
        let status = manager.status("orders").unwrap();
        assert_eq!(status.green_traffic_percentage, 100);
        assert_eq!(status.active_environment, Environment::Blue);

        sleep(Duration::from_secs(1)).await;
        let status = manager.status("orders").unwrap();
        assert_eq!(status.active_environment, Environment::Green);
        assert_eq!(status.green_traffic_percentage, 100);
        assert_eq!(status.pending_steps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uneven_steps_end_on_green() {
        let manager = manager();
        manager
            .switch_gradual("orders", Duration::from_secs(3), 3)
            .unwrap();

        sleep(Duration::from_millis(3_100)).await;
        assert_eq!(green_share(&manager), 99);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(green_share(&manager), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_switch_cancels_ramp() {
        let manager = manager();
        manager
            .switch_gradual("orders", Duration::from_secs(10), 2)
            .unwrap();

        sleep(Duration::from_secs(6)).await;
        assert_eq!(green_share(&manager), 50);

        manager.switch_instant("orders").unwrap();
        manager.rollback("orders").unwrap();
        assert_eq!(manager.status("orders").unwrap().pending_steps, 0);

        sleep(Duration::from_secs(10)).await;
        let status = manager.status("orders").unwrap();
        assert_eq!(status.active_environment, Environment::Blue);
        assert_eq!(status.green_traffic_percentage, 0);
    }

    #[test]
    fn test_gradual_rejects_bad_steps() {
        let manager = manager();
        assert!(matches!(
            manager.switch_gradual("orders", Duration::from_secs(10), 0),
            Err(DeploymentError::InvalidSteps(0))
        ));
        assert!(manager
            .switch_gradual("orders", Duration::from_secs(10), 101)
            .is_err());
    }

    #[test]
    fn test_gradual_rejects_overflowing_duration() {
        let manager = manager();
        assert!(matches!(
            manager.switch_gradual("orders", Duration::from_secs(u64::MAX), 1),
            Err(DeploymentError::InvalidDuration(_))
        ));
        assert!(matches!(
            manager.switch_gradual("orders", Duration::MAX, 100),
            Err(DeploymentError::InvalidDuration(_))
        ));
        let status = manager.status("orders").unwrap();
        assert_eq!(status.pending_steps, 0);
        assert_eq!(status.active_environment, Environment::Blue);
    }

    #[test]
    fn test_all_servers_lists_both_environments() {
        let manager = manager();
        let urls: Vec<String> = manager
            .all_servers("orders")
            .unwrap()
            .iter()
            .map(|s| s.url().to_string())
            .collect();
        assert_eq!(urls, vec!["http://blue:8080", "http://green:8080"]);
        assert!(manager.all_servers("missing").is_err());
    }

    #[test]
    fn test_servers_with_appends_green_once() {
        let manager = DeploymentManager::new();
        let blue = Arc::new(Server::new("http://blue:8080", 1, 100));
        let green = Arc::new(Server::new("http://green:8080", 1, 100));
        manager.define_environments("orders", vec![Arc::clone(&blue)], vec![green]);

        let merged = manager.servers_with("orders", vec![blue]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].url(), "http://green:8080");

        let plain = manager.servers_with("users", vec![Arc::new(Server::new("http://u:8080", 1, 100))]);
        assert_eq!(plain.len(), 1);
    }

    #[test]
    fn test_scheduled_in_past() {
        let manager = manager();
        let past = Utc::now() - chrono::Duration::seconds(5);
        assert!(matches!(
            manager.switch_scheduled("orders", past),
            Err(DeploymentError::ScheduleInPast(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_switch() {
        let manager = manager();
        manager
            .switch_scheduled("orders", Utc::now() + chrono::Duration::seconds(30))
            .unwrap();
        assert_eq!(manager.status("orders").unwrap().pending_steps, 1);

        sleep(Duration::from_secs(20)).await;
        assert_eq!(
            manager.status("orders").unwrap().active_environment,
            Environment::Blue
        );

        sleep(Duration::from_secs(15)).await;
        assert_eq!(
            manager.status("orders").unwrap().active_environment,
            Environment::Green
        );
    }
}

//! Session to server bindings.

use super::config::StickySessionConfig;
use crate::modules::load_balancer::Server;
use crate::modules::scheduler::TaskScheduler;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct SessionBinding {
    server: Arc<Server>,
    last_access: Instant,
}

/// Session statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Live bindings.
    pub total_sessions: usize,
    /// Live bindings per server URL.
    pub sessions_by_server: BTreeMap<String, usize>,
}

/// Keeps session bindings.
///
/// Each binding lives in its own map shard entry, so lookups for one
/// session are atomic and lookups for different sessions run in parallel.
#[derive(Debug)]
pub struct SessionManager {
    config: StickySessionConfig,
    sessions: DashMap<String, SessionBinding>,
}

impl SessionManager {
    /// Create a session manager.
    #[must_use]
    pub fn new(config: StickySessionConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &StickySessionConfig {
        &self.config
    }

    /// Generate a new, globally unique session identifier.
    #[must_use]
    pub fn generate_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Return the server bound to `session_id`, binding `fallback` when the
    /// session is unknown or expired.
    ///
    /// An empty `session_id` is replaced by a freshly generated one.
    pub fn get_or_assign_server(&self, session_id: &str, fallback: &Arc<Server>) -> Arc<Server> {
        let session_id = if session_id.is_empty() {
            Self::generate_session_id()
        } else {
            session_id.to_string()
        };
        let now = Instant::now();

        match self.sessions.entry(session_id) {
            Entry::Occupied(mut entry) => {
                let key = entry.key().clone();
                let binding = entry.get_mut();
                if now.saturating_duration_since(binding.last_access) > self.config.timeout {
                    debug!(session = %key, server = %fallback.url(), "Session expired, rebinding");
                    binding.server = Arc::clone(fallback);
                } else if !Arc::ptr_eq(&binding.server, fallback) {
                    debug!(session = %key, server = %binding.server.url(), "Session affinity hit");
                }
                binding.last_access = now;
                Arc::clone(&binding.server)
            },
            Entry::Vacant(entry) => {
                debug!(session = %entry.key(), server = %fallback.url(), "Session bound");
                entry.insert(SessionBinding {
                    server: Arc::clone(fallback),
                    last_access: now,
                });
                Arc::clone(fallback)
            },
        }
    }

    /// Server currently bound to a session, if the binding is live.
    #[must_use]
    pub fn bound_server(&self, session_id: &str) -> Option<Arc<Server>> {
        let binding = self.sessions.get(session_id)?;
        if binding.last_access.elapsed() > self.config.timeout {
            None
        } else {
            Some(Arc::clone(&binding.server))
        }
    }

    /// Drop a session binding.
    pub fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Remove every expired binding and return how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.sessions.len();
        let now = Instant::now();
        self.sessions.retain(|_, binding| {
            now.saturating_duration_since(binding.last_access) <= self.config.timeout
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, "Expired sessions cleaned up");
        }
        removed
    }

    /// Number of stored bindings, including expired ones not yet swept.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Session statistics.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for binding in self.sessions.iter() {
            stats.total_sessions += 1;
            *stats
                .sessions_by_server
                .entry(binding.server.url().to_string())
                .or_default() += 1;
        }
        stats
    }

    /// Start the periodic expiry sweep.
    pub fn start_cleanup(self: &Arc<Self>, scheduler: &TaskScheduler) {
        let manager = Arc::clone(self);
        scheduler.spawn_periodic(
            "session-cleanup",
            self.config.cleanup_interval,
            move || {
                let manager = Arc::clone(&manager);
                async move {
                    manager.cleanup_expired();
                }
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager(timeout: Duration) -> SessionManager {
        SessionManager::new(StickySessionConfig {
            enabled: true,
            timeout,
            cleanup_interval: Duration::from_secs(1),
            ..Default::default()
        })
    }

    fn server(url: &str) -> Arc<Server> {
        Arc::new(Server::new(url, 1, 100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_session_same_server() {
        let sessions = manager(Duration::from_secs(60));
        let a = server("http://a:8080");
        let b = server("http://b:8080");

        let first = sessions.get_or_assign_server("s1", &a);
        let second = sessions.get_or_assign_server("s1", &b);
        assert_eq!(first.url(), "http://a:8080");
        assert_eq!(second.url(), "http://a:8080");
        assert_eq!(sessions.session_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_refreshes_binding() {
        let sessions = manager(Duration::from_secs(60));
        let a = server("http://a:8080");
        let b = server("http://b:8080");

        sessions.get_or_assign_server("s1", &a);
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(45)).await;
            assert_eq!(sessions.get_or_assign_server("s1", &b).url(), "http://a:8080");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_binding_is_replaced() {
        let sessions = manager(Duration::from_secs(60));
        let a = server("http://a:8080");
        let b = server("http://b:8080");

        sessions.get_or_assign_server("s1", &a);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(sessions.bound_server("s1").is_none());
        assert_eq!(sessions.get_or_assign_server("s1", &b).url(), "http://b:8080");
        assert_eq!(sessions.bound_server("s1").unwrap().url(), "http://b:8080");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_session_id_generates_binding() {
        let sessions = manager(Duration::from_secs(60));
        let a = server("http://a:8080");

        assert_eq!(sessions.get_or_assign_server("", &a).url(), "http://a:8080");
        assert_eq!(sessions.session_count(), 1);
        assert!(sessions.bound_server("").is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = SessionManager::generate_session_id();
        let b = SessionManager::generate_session_id();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_stats() {
        let sessions = manager(Duration::from_secs(60));
        let a = server("http://a:8080");
        let b = server("http://b:8080");

        sessions.get_or_assign_server("s1", &a);
        sessions.get_or_assign_server("s2", &a);
        sessions.get_or_assign_server("s3", &b);

        let stats = sessions.stats();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.sessions_by_server["http://a:8080"], 2);
        assert_eq!(stats.sessions_by_server["http://b:8080"], 1);

        assert!(sessions.remove_session("s1"));
        assert!(!sessions.remove_session("s1"));
        assert_eq!(sessions.stats().sessions_by_server["http://a:8080"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let sessions = manager(Duration::from_secs(60));
        let a = server("http://a:8080");

        sessions.get_or_assign_server("old", &a);
        tokio::time::advance(Duration::from_secs(40)).await;
        sessions.get_or_assign_server("new", &a);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(sessions.cleanup_expired(), 1);
        assert!(sessions.bound_server("old").is_none());
        assert!(sessions.bound_server("new").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cleanup() {
        let sessions = Arc::new(manager(Duration::from_secs(5)));
        let scheduler = TaskScheduler::new();
        sessions.start_cleanup(&scheduler);

        sessions.get_or_assign_server("s1", &server("http://a:8080"));
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(sessions.session_count(), 0);
        scheduler.shutdown();
    }
}

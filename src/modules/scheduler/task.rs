//! Periodic and deferred task scheduling on the tokio runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Roughly thirty years, the same horizon tokio uses for "never".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Inner task handle that is aborted when its awaiting task is dropped,
/// so aborting the outer task also cancels work in flight.
struct AbortOnDrop(JoinHandle<()>);

impl Future for AbortOnDrop {
    type Output = Result<(), JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owns background tasks and aborts them on shutdown or drop.
///
/// Spawning requires a running tokio runtime.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    /// Create a scheduler with no tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` now and then every `period`.
    ///
    /// Each tick is spawned separately; a panicking tick is logged and the
    /// schedule carries on. A zero `period` is refused.
    pub fn spawn_periodic<F, Fut>(&self, name: impl Into<String>, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            warn!(task = %name, "Refusing to schedule periodic task with zero period");
            return;
        }
        debug!(task = %name, period_ms = period.as_millis() as u64, "Scheduling periodic task");

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = AbortOnDrop(tokio::spawn(task())).await {
                    warn!(task = %name, error = %e, "Scheduled tick failed");
                }
            }
        });
        self.track(handle);
    }

    /// Run `task` once after `delay`.
    ///
    /// Delays past the clock's range are clamped to a far-future deadline.
    pub fn spawn_after<Fut>(&self, name: impl Into<String>, delay: Duration, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
        self.spawn_at(name, deadline, task);
    }

    /// Run `task` once at `deadline`.
    pub fn spawn_at<Fut>(&self, name: impl Into<String>, deadline: Instant, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "Scheduling deferred task");

        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            if let Err(e) = AbortOnDrop(tokio::spawn(task)).await {
                warn!(task = %name, error = %e, "Deferred task failed");
            }
        });
        self.track(handle);
    }

    /// Number of tasks still running.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock().expect("tasks lock poisoned");
        tasks.retain(|h| !h.is_finished());
        tasks.len()
    }

    /// Abort every task.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().expect("tasks lock poisoned");
        let count = tasks.len();
        for handle in tasks.drain(..) {
            handle.abort();
        }
        if count > 0 {
            debug!(tasks = count, "Scheduler shut down");
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().expect("tasks lock poisoned");
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for handle in tasks.drain(..) {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_runs_immediately_then_every_period() {
        let scheduler = TaskScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&ticks);
        scheduler.spawn_periodic("counter", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_does_not_stop_schedule() {
        let scheduler = TaskScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&ticks);
        scheduler.spawn_periodic("flaky", Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first tick fails");
                }
            }
        });

        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_after() {
        let scheduler = TaskScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));

        let flag = Arc::clone(&fired);
        scheduler.spawn_after("once", Duration::from_secs(5), async move {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_tasks() {
        let scheduler = TaskScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));

        let flag = Arc::clone(&fired);
        scheduler.spawn_after("cancelled", Duration::from_secs(5), async move {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(scheduler.active_tasks(), 1);

        scheduler.shutdown();
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_refused() {
        let scheduler = TaskScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&ticks);
        scheduler.spawn_periodic("zero", Duration::ZERO, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_delay_is_clamped() {
        let scheduler = TaskScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));

        let flag = Arc::clone(&fired);
        scheduler.spawn_after("far", Duration::MAX, async move {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.active_tasks(), 1);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_running_tick() {
        let scheduler = TaskScheduler::new();
        let started = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicU32::new(0));

        let (start, finish) = (Arc::clone(&started), Arc::clone(&finished));
        scheduler.spawn_periodic("slow", Duration::from_secs(60), move || {
            let (start, finish) = (Arc::clone(&start), Arc::clone(&finish));
            async move {
                start.fetch_add(1, Ordering::SeqCst);
                time::sleep(Duration::from_secs(10)).await;
                finish.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        scheduler.shutdown();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_running_deferred_task() {
        let scheduler = TaskScheduler::new();
        let finished = Arc::new(AtomicU32::new(0));

        let flag = Arc::clone(&finished);
        scheduler.spawn_after("slow-once", Duration::from_secs(1), async move {
            time::sleep(Duration::from_secs(10)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_secs(2)).await;
        scheduler.shutdown();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}

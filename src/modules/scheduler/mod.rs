//! # Scheduler
//!
//! Timer/executor abstraction for the balancer's background work: health
//! probes, session sweeps and blue-green steps. Every task runs on its own
//! tokio task and every periodic tick runs in isolation, so one failing
//! tick never stops another task or the next tick.

mod task;

pub use task::TaskScheduler;

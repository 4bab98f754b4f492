//! Sliding window log.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Timestamps of the requests admitted within the trailing window.
///
/// A timestamp leaves the window once it is `window` old, so a request
/// arriving exactly as the oldest entry expires is admitted.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    max_requests: u32,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Create an empty window.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            timestamps: VecDeque::with_capacity(max_requests as usize),
        }
    }

    /// Get the request limit.
    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    fn purge(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit and record one request if the window has room.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.purge(now);
        if self.timestamps.len() < self.max_requests as usize {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Requests still admissible in the current window.
    pub fn remaining(&mut self, now: Instant) -> u32 {
        self.purge(now);
        self.max_requests
            .saturating_sub(self.timestamps.len() as u32)
    }

    /// Time until the oldest recorded request leaves the window.
    #[must_use]
    pub fn reset_after(&self, now: Instant) -> Duration {
        self.timestamps
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
            .unwrap_or_default()
    }
}

//! Token bucket with periodic full refill.

use std::time::Duration;
use tokio::time::Instant;

/// A bucket of `capacity` tokens that refills completely, not gradually,
/// once `window` has elapsed since the last refill.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    tokens: u32,
    window: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    #[must_use]
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self::new_at(capacity, window, Instant::now())
    }

    /// Create a full bucket whose window starts at `now`.
    #[must_use]
    pub fn new_at(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            window,
            last_refill: now,
        }
    }

    /// Get the capacity.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn refill(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_refill) >= self.window {
            self.tokens = self.capacity;
            self.last_refill = now;
        }
    }

    /// Take one token if any is left.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Tokens left, counting a refill that is due.
    pub fn remaining(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens
    }

    /// Time until the next full refill.
    #[must_use]
    pub fn reset_after(&self, now: Instant) -> Duration {
        (self.last_refill + self.window).saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_until_empty() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(3, Duration::from_secs(60), now);

        assert!(bucket.try_consume(now));
        assert!(bucket.try_consume(now));
        assert!(bucket.try_consume(now));
        assert!(!bucket.try_consume(now));
        assert_eq!(bucket.remaining(now), 0);
    }

    #[test]
    fn test_no_partial_refill() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(2, Duration::from_secs(60), now);
        bucket.try_consume(now);
        bucket.try_consume(now);

        let later = now + Duration::from_secs(59);
        assert!(!bucket.try_consume(later));
        assert_eq!(bucket.reset_after(later), Duration::from_secs(1));
    }

    #[test]
    fn test_full_refill_after_window() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(2, Duration::from_secs(60), now);
        bucket.try_consume(now);
        bucket.try_consume(now);

        let later = now + Duration::from_secs(60);
        assert_eq!(bucket.remaining(later), 2);
        assert!(bucket.try_consume(later));
        assert_eq!(bucket.reset_after(later), Duration::from_secs(60));
    }
}

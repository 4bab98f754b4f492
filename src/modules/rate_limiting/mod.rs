//! # Rate Limiting Module
//!
//! Per-client admission control. One algorithm is chosen when the limiter
//! is built:
//!
//! - **Token bucket**: `max_requests` tokens, refilled all at once when a
//!   full window has passed since the last refill.
//! - **Sliding window**: admits a request while fewer than `max_requests`
//!   requests were seen in the trailing window.
//!
//! State is created lazily per client identifier and kept for the process
//! lifetime.

mod bucket;
mod config;
mod error;
mod limiter;
mod window;

pub use bucket::TokenBucket;
pub use config::{RateLimitAlgorithm, RateLimitConfig};
pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{RateLimitDecision, RateLimitInfo, RateLimiter};
pub use window::SlidingWindow;

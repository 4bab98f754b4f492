//! # Circuit Breaker Module
//!
//! Per-server failure tracking. Each server has an independent automaton:
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ───────────────────────▶ OPEN
//!     ▲                              │ timeout elapsed
//!     │ successes >= threshold       ▼ (checked lazily)
//!     └──────────────────────── HALF_OPEN ──── any failure ──▶ OPEN
//! ```

pub mod breaker;
pub mod config;

pub use breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use config::CircuitBreakerConfig;

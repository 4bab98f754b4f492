//! # Sticky Session Module
//!
//! Binds opaque session identifiers to servers so that requests carrying
//! the same session cookie keep reaching the same backend.
//!
//! Bindings expire `timeout` after their last access. Expiry is checked
//! lazily on every lookup and, more coarsely, by a periodic sweep started
//! with [`SessionManager::start_cleanup`].

mod config;
mod manager;

pub use config::StickySessionConfig;
pub use manager::{SessionManager, SessionStats};

//! Session controller and its repeating timer.

mod controller;
mod ticker;

pub use controller::{AppState, SessionController, SessionStatus};

/// Errors returned by session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session duration must be positive, got {0} minutes")]
    InvalidDuration(u32),
}

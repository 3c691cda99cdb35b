//! Data models for youstrict entities.

mod duration;
mod route;
mod session;

pub use duration::{
    DurationError, DurationPicker, WatchDuration, CUSTOM_MAX_MINUTES, CUSTOM_MIN_MINUTES,
    CUSTOM_STEP_MINUTES, DEFAULT_MINUTES, PRESET_MINUTES,
};
pub use route::{Route, RouteError};
pub use session::Session;

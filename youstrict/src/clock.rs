//! Session clock: remaining-time math over wall-clock milliseconds.
//!
//! Everything here is a pure function of a session and "now". The only
//! stateful piece is the [`Clock`] source the controller reads from.

use chrono::{DateTime, Local, Utc};

use crate::models::Session;

/// Milliseconds in one minute.
pub const MS_PER_MINUTE: i64 = 60_000;

/// Source of wall-clock time in milliseconds since the epoch.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Expiry instant for a session started at `started_at`.
pub fn compute_expires_at(started_at: i64, duration_minutes: u32) -> i64 {
    started_at.saturating_add(i64::from(duration_minutes) * MS_PER_MINUTE)
}

/// A missing session is never active.
pub const fn is_active(session: Option<&Session>, now: i64) -> bool {
    match session {
        Some(s) => now < s.expires_at,
        None => false,
    }
}

/// Seconds left, rounded up so the countdown never shows 0 while time remains.
pub const fn remaining_seconds(session: Option<&Session>, now: i64) -> u64 {
    match session {
        Some(s) => seconds_until(s.expires_at, now),
        None => 0,
    }
}

/// Whole seconds from `now` until `expires_at`, rounded up, never negative.
pub const fn seconds_until(expires_at: i64, now: i64) -> u64 {
    let left = expires_at.saturating_sub(now);
    if left <= 0 {
        0
    } else {
        left.unsigned_abs().div_ceil(1000)
    }
}

/// Render a countdown as `M:SS`, or `H:MM:SS` once it reaches an hour.
pub fn format_countdown(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Local `HH:MM:SS` at which a session started at `now` would end.
pub fn preview_end(now: i64, duration_minutes: u32) -> Option<String> {
    let expires_at = compute_expires_at(now, duration_minutes);
    DateTime::<Utc>::from_timestamp_millis(expires_at)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S").to_string())
}

//! Session model representing a parent-approved watch session.

use serde::{Deserialize, Serialize};

use crate::clock;

/// A session grants timed access to the watch screens.
///
/// `expires_at` is fixed when the session is created and is never recomputed
/// from `duration_minutes`, so it stays immutable until the session is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// When the parent confirmed the duration (ms since epoch).
    pub started_at: i64,
    /// Parent-chosen budget in minutes.
    pub duration_minutes: u32,
    /// When access ends (ms since epoch).
    pub expires_at: i64,
}

impl Session {
    /// Create a session starting at `started_at`.
    pub fn new(started_at: i64, duration_minutes: u32) -> Self {
        Self {
            started_at,
            duration_minutes,
            expires_at: clock::compute_expires_at(started_at, duration_minutes),
        }
    }

    /// Whether the session still grants access at `now`.
    pub const fn is_active_at(&self, now: i64) -> bool {
        clock::is_active(Some(self), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let session = Session::new(1_000, 15);
        let json = serde_json::to_value(session).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "startedAt": 1_000,
                "durationMinutes": 15,
                "expiresAt": 1_000 + 15 * 60_000,
            })
        );
    }

    #[test]
    fn stored_expiry_is_not_recomputed_from_duration() {
        let raw = r#"{"startedAt":0,"durationMinutes":60,"expiresAt":5000}"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert_eq!(session.expires_at, 5_000);
        assert!(session.is_active_at(4_999));
        assert!(!session.is_active_at(5_000));
    }
}

//! Session record persistence on top of a [`SecureStore`].

use std::sync::Arc;

use tracing::warn;

use super::{SecureStore, StoreError};
use crate::models::Session;

/// Well-known key holding the session record.
pub const SESSION_KEY: &str = "parental_session_v1";

/// Reads and writes the one session record.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SecureStore>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SecureStore>) -> Self {
        Self { backend }
    }

    /// Replace the stored record with `session`.
    pub async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        self.backend.set(SESSION_KEY, &json).await
    }

    /// The stored record, or `None` when absent or unreadable.
    ///
    /// A malformed or inconsistent payload is treated as "no session". Only a
    /// backend failure is reported as an error.
    pub async fn load(&self) -> Result<Option<Session>, StoreError> {
        let Some(raw) = self.backend.get(SESSION_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if session.duration_minutes > 0 && session.expires_at > session.started_at => {
                Ok(Some(session))
            }
            Ok(session) => {
                warn!(?session, "Ignoring inconsistent session record");
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "Ignoring malformed session record");
                Ok(None)
            }
        }
    }

    /// Delete the record; nothing happens if there is none.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.backend.delete(SESSION_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::store::{FileSecureStore, MemorySecureStore};

    const T0: i64 = 1_700_000_000_000;

    fn memory_store() -> (Arc<MemorySecureStore>, SessionStore) {
        let backend = Arc::new(MemorySecureStore::new());
        (backend.clone(), SessionStore::new(backend))
    }

    #[tokio::test]
    async fn load_after_save_agrees_with_clock() {
        let (_, store) = memory_store();
        let session = Session::new(T0, 30);
        store.save(&session).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, session);
        for now in [T0, T0 + 90_500, session.expires_at, session.expires_at + 1] {
            assert_eq!(
                clock::is_active(Some(&loaded), now),
                clock::is_active(Some(&session), now)
            );
            assert_eq!(
                clock::remaining_seconds(Some(&loaded), now),
                clock::remaining_seconds(Some(&session), now)
            );
        }
    }

    #[tokio::test]
    async fn save_replaces_previous_session() {
        let (_, store) = memory_store();
        store.save(&Session::new(T0, 15)).await.unwrap();
        store.save(&Session::new(T0 + 5, 60)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.duration_minutes, 60);
        assert_eq!(loaded.started_at, T0 + 5);
    }

    #[tokio::test]
    async fn missing_or_corrupt_record_is_none() {
        let (backend, store) = memory_store();
        assert_eq!(store.load().await.unwrap(), None);

        backend.set(SESSION_KEY, "{not json").await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        backend
            .set(SESSION_KEY, r#"{"startedAt":10,"durationMinutes":0,"expiresAt":10}"#)
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let (_, store) = memory_store();
        store.clear().await.unwrap();
        store.save(&Session::new(T0, 15)).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn persists_across_file_store_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let session = Session::new(T0, 45);

        let first = SessionStore::new(Arc::new(FileSecureStore::open(dir.path()).unwrap()));
        first.save(&session).await.unwrap();

        let second = SessionStore::new(Arc::new(FileSecureStore::open(dir.path()).unwrap()));
        assert_eq!(second.load().await.unwrap(), Some(session));
    }
}

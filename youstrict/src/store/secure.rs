//! Confidential key-value storage.
//!
//! The file backend keeps one file per key inside a private directory. Every
//! value is sealed with a SHA-256 tag keyed by a per-install secret, so a value
//! edited by hand (or copied from another install) no longer verifies and
//! reads back as absent.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::StoreError;

const SECRET_FILE: &str = ".seal-key";
const SECRET_LEN: usize = 32;

/// Key-value persistence that the end user cannot casually read or edit.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read the value under `key`; `None` when absent or failing verification.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// On-disk envelope for a sealed value.
#[derive(Debug, Serialize, Deserialize)]
struct Sealed {
    value: String,
    seal: String,
}

/// File-backed [`SecureStore`].
#[derive(Debug)]
pub struct FileSecureStore {
    dir: PathBuf,
    secret: [u8; SECRET_LEN],
}

impl FileSecureStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        restrict_permissions(&dir, 0o700)?;

        let secret = load_or_create_secret(&dir.join(SECRET_FILE))?;
        debug!(dir = %dir.display(), "Opened secure store");
        Ok(Self { dir, secret })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn seal(&self, key: &str, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        let envelope = Sealed {
            value: value.to_string(),
            seal: self.seal(key, value),
        };
        let bytes = serde_json::to_vec(&envelope)?;

        // Readers never observe a half-written value.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        restrict_permissions(&tmp, 0o600)?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.key_path(key)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let Ok(envelope) = serde_json::from_slice::<Sealed>(&raw) else {
            warn!(key, "Stored value is not a sealed envelope; ignoring");
            return Ok(None);
        };
        if envelope.seal != self.seal(key, &envelope.value) {
            warn!(key, "Stored value failed seal verification; ignoring");
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// In-process [`SecureStore`]; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySecureStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}

fn load_or_create_secret(path: &Path) -> Result<[u8; SECRET_LEN], StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            return bytes.try_into().map_err(|bytes: Vec<u8>| {
                StoreError::Unavailable(format!(
                    "seal key at {} has {} bytes, expected {SECRET_LEN}",
                    path.display(),
                    bytes.len()
                ))
            });
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let secret: [u8; SECRET_LEN] = rand::random();
    std::fs::write(path, secret).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    restrict_permissions(path, 0o600)?;
    debug!(path = %path.display(), "Generated new seal key");
    Ok(secret)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|source| {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_store_round_trip_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileSecureStore::open(dir.path()).unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "hello").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("hello"));

        store.set("k", "again").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("again"));

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        FileSecureStore::open(dir.path())
            .unwrap()
            .set("k", "kept")
            .await
            .unwrap();

        let reopened = FileSecureStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn hand_edited_value_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileSecureStore::open(dir.path()).unwrap();
        store.set("k", "original").await.unwrap();

        let path = dir.path().join("k.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("original", "tampered")).unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileSecureStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.set("../escape", "x").await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileSecureStore::open(dir.path().join("vault")).unwrap();
        store.set("k", "v").await.unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(store.dir()), 0o700);
        assert_eq!(mode(&store.dir().join("k.json")), 0o600);
        assert_eq!(mode(&store.dir().join(SECRET_FILE)), 0o600);
    }
}

//! Persistence for the single session record.

mod secure;
mod session_store;

use std::path::PathBuf;

pub use secure::{FileSecureStore, MemorySecureStore, SecureStore};
pub use session_store::SessionStore;
#[cfg(test)]
pub use session_store::SESSION_KEY;

#[cfg(test)]
pub(crate) use secure::testing;

/// Errors raised by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

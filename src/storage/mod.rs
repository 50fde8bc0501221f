//! Root key storage
//!
//! - File: Durable JSON map of `identifier (hex) -> root key (hex)`
//! - Memory: Process-local map for tests and throwaway deployments

mod file;
mod memory;

pub use file::{FileStore, FileStoreConfig, DEFAULT_STORE_PATH};
pub use memory::MemoryStore;

use crate::auth::RootKey;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("root key not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt store entry '{identifier}': {reason}")]
    Corrupt { identifier: String, reason: String },
}

/// Durable mapping from token identifier to root key.
///
/// Implementations serialize writers against each other and against readers:
/// a `get` observes the map either before or after a concurrent `put`, never a
/// partial update. `put` returns only once the entry is durable.
pub trait RootKeyStore: Send + Sync {
    /// Store a root key, replacing any existing entry for the identifier
    fn put(&self, identifier: &[u8], root_key: &RootKey) -> Result<(), StorageError>;

    /// Store a root key only if the identifier is unused.
    ///
    /// Returns `Ok(false)` without writing if the identifier already exists.
    fn put_new(&self, identifier: &[u8], root_key: &RootKey) -> Result<bool, StorageError>;

    /// Fetch the root key for an identifier
    fn get(&self, identifier: &[u8]) -> Result<RootKey, StorageError>;

    /// Number of stored keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode a hex root key as read back from a store
pub(crate) fn decode_entry(identifier: &str, key_hex: &str) -> Result<RootKey, StorageError> {
    let bytes = hex::decode(key_hex).map_err(|e| StorageError::Corrupt {
        identifier: identifier.to_string(),
        reason: e.to_string(),
    })?;

    RootKey::from_slice(&bytes).ok_or_else(|| StorageError::Corrupt {
        identifier: identifier.to_string(),
        reason: format!("expected {} key bytes, got {}", RootKey::LEN, bytes.len()),
    })
}

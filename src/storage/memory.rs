//! In-memory root key store (not durable)

use crate::auth::RootKey;
use crate::storage::{RootKeyStore, StorageError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Root key store that lives only as long as the process.
///
/// Tokens minted against it stop verifying after a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, RootKey>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RootKeyStore for MemoryStore {
    fn put(&self, identifier: &[u8], root_key: &RootKey) -> Result<(), StorageError> {
        self.entries.write().insert(identifier.to_vec(), root_key.clone());
        Ok(())
    }

    fn put_new(&self, identifier: &[u8], root_key: &RootKey) -> Result<bool, StorageError> {
        let mut entries = self.entries.write();
        if entries.contains_key(identifier) {
            return Ok(false);
        }
        entries.insert(identifier.to_vec(), root_key.clone());
        Ok(true)
    }

    fn get(&self, identifier: &[u8]) -> Result<RootKey, StorageError> {
        self.entries
            .read()
            .get(identifier)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(hex::encode(identifier)))
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

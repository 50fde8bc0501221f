//! JSON file storage backend

use crate::auth::RootKey;
use crate::storage::{decode_entry, RootKeyStore, StorageError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Default store location, relative to the working directory
pub const DEFAULT_STORE_PATH: &str = "mintgate_keys.json";

/// File store configuration
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub path: PathBuf,
}

impl FileStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}

/// Root key store backed by a single JSON document.
///
/// The whole map is loaded at construction and rewritten on every mutation.
/// That keeps the format trivial but makes each `put` O(n) in the number of
/// stored keys.
pub struct FileStore {
    path: PathBuf,
    /// identifier (hex) -> root key (hex)
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store, loading any existing file
    pub fn new(config: FileStoreConfig) -> Result<Self, StorageError> {
        let entries = load(&config.path)?;

        info!(path = %config.path.display(), keys = entries.len(), "Root key store loaded");

        Ok(Self {
            path: config.path,
            entries: RwLock::new(entries),
        })
    }

    /// Shorthand for `FileStore::new(FileStoreConfig::new(path))`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::new(FileStoreConfig::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn insert(&self, identifier: &[u8], root_key: &RootKey, overwrite: bool) -> Result<bool, StorageError> {
        let id_hex = hex::encode(identifier);

        // Held across the flush so readers never see a key that isn't on disk yet
        let mut entries = self.entries.write();

        if !overwrite && entries.contains_key(&id_hex) {
            return Ok(false);
        }

        let mut next = entries.clone();
        next.insert(id_hex.clone(), hex::encode(root_key.as_bytes()));

        if let Err(e) = persist(&self.path, &next) {
            error!(path = %self.path.display(), error = %e, "Failed to persist root key store");
            return Err(e);
        }

        *entries = next;
        debug!(identifier = %id_hex, "Stored root key");

        Ok(true)
    }
}

impl RootKeyStore for FileStore {
    fn put(&self, identifier: &[u8], root_key: &RootKey) -> Result<(), StorageError> {
        self.insert(identifier, root_key, true).map(|_| ())
    }

    fn put_new(&self, identifier: &[u8], root_key: &RootKey) -> Result<bool, StorageError> {
        self.insert(identifier, root_key, false)
    }

    fn get(&self, identifier: &[u8]) -> Result<RootKey, StorageError> {
        let id_hex = hex::encode(identifier);
        let entries = self.entries.read();

        match entries.get(&id_hex) {
            Some(key_hex) => decode_entry(&id_hex, key_hex),
            None => Err(StorageError::NotFound(id_hex)),
        }
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn load(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(io_error(path, e)),
    };

    let entries: BTreeMap<String, String> = serde_json::from_slice(&data)?;

    // Reject garbage up front rather than on first lookup
    for (id_hex, key_hex) in &entries {
        hex::decode(id_hex).map_err(|e| StorageError::Corrupt {
            identifier: id_hex.clone(),
            reason: e.to_string(),
        })?;
        decode_entry(id_hex, key_hex)?;
    }

    Ok(entries)
}

/// Write the full map to a sibling temp file, fsync it, then rename it into place
fn persist(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
    let data = serde_json::to_vec(entries)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
    file.write_all(&data).map_err(|e| io_error(&tmp_path, e))?;
    file.sync_all().map_err(|e| io_error(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))?;

    // The rename itself is only durable once the directory entry is flushed
    #[cfg(unix)]
    {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| io_error(parent, e))?;
    }

    Ok(())
}

//! Key-value storage backends for persisted auth state.
//!
//! The session layer writes two records (the durable credential and the
//! short-lived verdict cache); where they live is decided by the backend:
//! - `MemoryStore`: process memory, shareable between providers
//! - `FileStore`: one JSON file per key in a directory
//! - `KeyringStore`: OS keychain entry per key
//! - `NoStorage`: no storage environment at all (headless callers)

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use keyring::Entry;
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    fn unavailable(context: &str, err: impl fmt::Display) -> Self {
        StorageError::Unavailable(format!("{}: {}", context, err))
    }
}

pub trait KeyValueStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// False when there is no storage environment to read from at all.
    fn is_attached(&self) -> bool {
        true
    }
}

// ===== Memory =====

/// In-memory store. Clones share the same map, so two providers built on
/// clones of one store behave like two page loads sharing storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

// ===== Files =====

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| StorageError::unavailable("Failed to read store file", e))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StorageError::unavailable("Failed to create store directory", e))?;

        // Each writer gets its own temp file, renamed into place whole
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| StorageError::unavailable("Failed to create temp store file", e))?;
        tmp.write_all(value.as_bytes())
            .map_err(|e| StorageError::unavailable("Failed to write store file", e))?;
        tmp.persist(self.path(key))
            .map(|_| ())
            .map_err(|e| StorageError::unavailable("Failed to replace store file", e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path(key);
        if path.exists() {
            std::fs::remove_file(path)
                .map_err(|e| StorageError::unavailable("Failed to remove store file", e))?;
        }
        Ok(())
    }
}

// ===== OS keychain =====

/// Stores each key as a keychain entry under one service name.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service, key)
            .map_err(|e| StorageError::unavailable("Failed to create keyring entry", e))
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::unavailable("Failed to read from keychain", e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StorageError::unavailable("Failed to store in keychain", e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::unavailable("Failed to delete from keychain", e)),
        }
    }
}

// ===== Detached =====

/// Backend for contexts with no storage environment (server-side rendering,
/// batch jobs). Nothing can be read or written.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStorage;

impl KeyValueStore for NoStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("no storage environment".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("no storage environment".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("no storage environment".to_string()))
    }

    fn is_attached(&self) -> bool {
        false
    }
}

// ===== Record slot =====

/// One JSON record under one key, mirrored in memory.
///
/// The backend is authoritative: other providers and processes may write
/// the same key, so callers `reload()` before acting on the value. The first
/// backend write failure switches the slot to memory-only mode, after which
/// the backend is not touched again and the memory copy is the truth.
#[derive(Debug)]
pub(crate) struct Slot<T> {
    key: &'static str,
    backend: Arc<dyn KeyValueStore>,
    value: Option<T>,
    persistent: bool,
}

impl<T: Serialize + DeserializeOwned> Slot<T> {
    /// Read whatever a previous run left behind. Missing, unreadable and
    /// corrupt records all open as empty.
    pub(crate) fn open(key: &'static str, backend: Arc<dyn KeyValueStore>) -> Self {
        let value = read_record(key, backend.as_ref()).unwrap_or_default();
        Self {
            key,
            persistent: backend.is_attached(),
            backend,
            value,
        }
    }

    /// Pick up whatever is persisted now. A read failure keeps the memory
    /// copy; a memory-only slot is left alone.
    pub(crate) fn reload(&mut self) {
        if !self.persistent {
            return;
        }
        if let Some(value) = read_record(self.key, self.backend.as_ref()) {
            self.value = value;
        }
    }

    pub(crate) fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.backend.is_attached()
    }

    #[cfg(test)]
    pub(crate) fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub(crate) fn put(&mut self, value: T) -> Result<(), StorageError> {
        let result = if self.persistent {
            serde_json::to_string(&value)
                .map_err(|e| StorageError::unavailable("Failed to serialize record", e))
                .and_then(|raw| self.backend.set(self.key, &raw))
        } else {
            Ok(())
        };
        self.value = Some(value);
        self.degrade_on(result)
    }

    pub(crate) fn clear(&mut self) -> Result<(), StorageError> {
        self.value = None;
        let result = if self.persistent {
            self.backend.remove(self.key)
        } else {
            Ok(())
        };
        self.degrade_on(result)
    }

    fn degrade_on(&mut self, result: Result<(), StorageError>) -> Result<(), StorageError> {
        if let Err(ref e) = result {
            warn!(key = self.key, error = %e, "Storage failed, keeping auth state in memory only");
            self.persistent = false;
        }
        result
    }
}

/// `None` when the backend could not be read, `Some(None)` when the record
/// is missing or corrupt.
fn read_record<T: DeserializeOwned>(key: &str, backend: &dyn KeyValueStore) -> Option<Option<T>> {
    match backend.get(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => Some(Some(value)),
            Err(e) => {
                debug!(key, error = %e, "Discarding corrupt stored record");
                Some(None)
            }
        },
        Ok(None) => Some(None),
        Err(e) => {
            debug!(key, error = %e, "Stored record unreadable");
            None
        }
    }
}

//! Session-scoped slot storage.
//!
//! Credentials are persisted as plain strings in named slots, the same way
//! a browser keeps them in session storage. Two backends are provided:
//!
//! - [`MemoryStorage`]: lives as long as the process; clones share the same
//!   slots, so handing a clone to a second manager simulates a page reload.
//! - [`FileStorage`]: one JSON object file. Writes go through a temp file,
//!   fsync and rename, so a reader never observes a half-written file.
//!
//! No backend encrypts anything; the trust boundary is the storage location.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

/// Storage errors.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Persisted data could not be parsed.
    #[error("Corrupt session data: {0}")]
    Corrupt(String),

    /// A previous holder of the storage lock panicked.
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Named-slot storage with all-or-nothing multi-slot updates.
pub trait SessionStorage: Send + Sync {
    /// Read every slot in one consistent view.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read or parsed.
    fn read(&self) -> Result<HashMap<String, String>, StorageError>;

    /// Set `set` slots and remove `remove` slots in one step; other slots are
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update could not be persisted. On error
    /// no slot has changed.
    fn apply(&self, set: &[(&str, String)], remove: &[&str]) -> Result<(), StorageError>;

    /// Set all given slots in one step.
    ///
    /// # Errors
    ///
    /// See [`SessionStorage::apply`].
    fn write(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        self.apply(entries, &[])
    }

    /// Remove all given slots in one step.
    ///
    /// # Errors
    ///
    /// See [`SessionStorage::apply`].
    fn remove(&self, slots: &[&str]) -> Result<(), StorageError> {
        self.apply(&[], slots)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex.lock().map_err(|_| StorageError::LockPoisoned)
}

// =============================================================================
// Memory storage
// =============================================================================

/// In-process storage. Clones share slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage pre-populated with slots.
    #[must_use]
    pub fn with_slots<I, K, V>(slots: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = slots
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            slots: Arc::new(Mutex::new(map)),
        }
    }
}

impl SessionStorage for MemoryStorage {
    fn read(&self) -> Result<HashMap<String, String>, StorageError> {
        Ok(lock(&self.slots)?.clone())
    }

    fn apply(&self, set: &[(&str, String)], remove: &[&str]) -> Result<(), StorageError> {
        let mut slots = lock(&self.slots)?;
        for slot in remove {
            slots.remove(*slot);
        }
        for (slot, value) in set {
            slots.insert((*slot).to_string(), value.clone());
        }
        Ok(())
    }
}

// =============================================================================
// File storage
// =============================================================================

/// Single JSON file storage with atomic replace.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStorage {
    /// Create a file-backed storage. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling of the backing file with `.tmp` appended to the full name.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&contents).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    fn persist(&self, slots: &HashMap<String, String>) -> Result<(), StorageError> {
        if slots.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let body =
            serde_json::to_vec_pretty(slots).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            target: "hv.storage",
            path = %self.path.display(),
            slots = slots.len(),
            "Session file written"
        );
        Ok(())
    }

    /// Load for modification. A corrupt file is replaced rather than
    /// blocking every future write.
    fn load_for_update(&self) -> Result<HashMap<String, String>, StorageError> {
        match self.load() {
            Err(StorageError::Corrupt(reason)) => {
                warn!(
                    target: "hv.storage",
                    path = %self.path.display(),
                    reason = %reason,
                    "Discarding corrupt session file"
                );
                Ok(HashMap::new())
            }
            other => other,
        }
    }
}

impl SessionStorage for FileStorage {
    fn read(&self) -> Result<HashMap<String, String>, StorageError> {
        let _guard = lock(&self.guard)?;
        self.load()
    }

    fn apply(&self, set: &[(&str, String)], remove: &[&str]) -> Result<(), StorageError> {
        let _guard = lock(&self.guard)?;
        let mut slots = self.load_for_update()?;
        for slot in remove {
            slots.remove(*slot);
        }
        for (slot, value) in set {
            slots.insert((*slot).to_string(), value.clone());
        }
        self.persist(&slots)
    }
}

//! Key-value backends for the local edit buffer
//!
//! The buffer only needs string keys and string values, the same shape as
//! browser local storage. [`FileStorage`] keeps every key in one JSON object
//! on disk and enforces a byte quota on it; [`MemoryStorage`] is used in
//! tests and for clients without a data directory.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::error::{StorageError, StorageResult};

/// String key-value storage
pub trait BufferStorage: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// In-memory storage with an optional quota
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
    quota: Option<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the summed size of keys and values
    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(quota),
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BufferStorage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries();

        if let Some(quota) = self.quota {
            let needed: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum::<u64>()
                + (key.len() + value.len()) as u64;
            if needed > quota {
                return Err(StorageError::QuotaExceeded {
                    path: PathBuf::from(":memory:"),
                    needed,
                    quota,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries().keys().cloned().collect())
    }
}

/// All buffer entries in a single JSON file
///
/// Each mutation rewrites the whole file atomically, so a crash mid-write
/// leaves the previous contents in place.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    quota: u64,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: PathBuf, quota: u64) -> Self {
        Self {
            path,
            quota,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| StorageError::ReadError {
            path: self.path.clone(),
            source,
        })?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| StorageError::InvalidFormat {
            path: self.path.clone(),
            details: e.to_string(),
        })
    }

    /// Read the map ahead of a mutation
    ///
    /// An unparseable file is moved aside so new edits can still be staged.
    fn read_map_for_write(&self) -> StorageResult<BTreeMap<String, String>> {
        match self.read_map() {
            Err(StorageError::InvalidFormat { details, .. }) => {
                let backup_path = self.backup_path();
                fs::rename(&self.path, &backup_path)
                    .map_err(|e| StorageError::from_io(e, backup_path.clone()))?;
                warn!(
                    path = %self.path.display(),
                    backup = %backup_path.display(),
                    %details,
                    "Edit buffer file is corrupted, starting fresh"
                );
                Ok(BTreeMap::new())
            }
            result => result,
        }
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt.backup");
        self.path.with_file_name(name)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        let json = serde_json::to_vec(map)?;
        let needed = json.len() as u64;
        if needed > self.quota {
            return Err(StorageError::QuotaExceeded {
                path: self.path.clone(),
                needed,
                quota: self.quota,
            });
        }

        atomic_write(&self.path, &json)
    }
}

impl BufferStorage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.guard();
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.guard();
        let mut map = self.read_map_for_write()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let _guard = self.guard();
        let mut map = self.read_map_for_write()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let _guard = self.guard();
        Ok(self.read_map()?.into_keys().collect())
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

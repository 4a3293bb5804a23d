//! Storage layer for simplr
//!
//! All state lives under a single data directory. Profile-scoped collections
//! are addressed by storage key (see [`crate::profile::ProfilePartition`]).
//!
//! # Directory Structure
//!
//! ```text
//! <data_dir>/
//!   simplr.toml                 # Optional configuration
//!   active_profile              # Persisted active profile tag
//!   tasks.json                  # Personal tasks (legacy unprefixed keys)
//!   categories.json
//!   filter.json
//!   work_tasks.json             # Other profiles prefix their tag
//!   work_categories.json
//!   os/                         # File-backed OS collaborators (CLI host)
//!     reminders.json
//!     search-index.json
//!     badge.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, PersistError, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};

/// Name of the configuration file inside the data directory
pub const CONFIG_FILE: &str = "simplr.toml";

/// Name of the persisted active profile file
pub const ACTIVE_PROFILE_FILE: &str = "active_profile";

/// Subdirectory for file-backed OS collaborators
pub const OS_DIR: &str = "os";

/// Storage manager for simplr state
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
    lock_timeout_ms: u64,
}

impl Storage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// How long reads and writes wait for another process's lock.
    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    /// Resolve the data directory: explicit path, else the platform data dir.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        let dirs = directories::ProjectDirs::from("app", "simplr", "simplr").ok_or_else(|| {
            Error::OperationFailed("cannot determine a data directory".to_string())
        })?;
        Ok(Self::new(dirs.data_dir()))
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path for a storage key (`<data_dir>/<key>.json`)
    pub fn key_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn active_profile_file(&self) -> PathBuf {
        self.data_dir.join(ACTIVE_PROFILE_FILE)
    }

    pub fn os_dir(&self) -> PathBuf {
        self.data_dir.join(OS_DIR)
    }

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(self.os_dir())?;
        Ok(())
    }

    // =========================================================================
    // Keyed collections
    // =========================================================================

    /// Raw bytes stored under `key`, `None` when nothing was ever written.
    pub fn read_key(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, PersistError> {
        let path = self.key_path(key);
        lock::read_locked(&path, self.lock_timeout_ms).map_err(|err| persist_io(&path, err))
    }

    /// Encode `data` as JSON and write it under `key` (locked, atomic).
    pub fn write_key<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
    ) -> std::result::Result<(), PersistError> {
        let json = serde_json::to_vec_pretty(data).map_err(|source| PersistError::Encode {
            key: key.to_string(),
            source,
        })?;
        let path = self.key_path(key);
        lock::write_atomic_locked(&path, &json, self.lock_timeout_ms)
            .map_err(|err| persist_io(&path, err))
    }

    // =========================================================================
    // Plain JSON files (OS collaborator state)
    // =========================================================================

    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(data)?;
        lock::write_atomic_locked(path, &json, self.lock_timeout_ms)
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match lock::read_locked(path, self.lock_timeout_ms)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read, edit and rewrite `path` under one lock, so concurrent editors
    /// never drop each other's changes. Missing or undecodable files start
    /// from `T::default()`.
    pub fn update_json<T, R>(&self, path: &Path, edit: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let _guard = lock::FileLock::acquire(lock::lock_path_for(path), self.lock_timeout_ms)?;
        let mut data = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::warn!("cannot decode {}, starting empty: {err}", path.display());
                T::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(err) => return Err(err.into()),
        };
        let result = edit(&mut data);
        lock::write_atomic(path, &serde_json::to_vec_pretty(&data)?)?;
        Ok(result)
    }
}

fn persist_io(path: &Path, err: Error) -> PersistError {
    match err {
        Error::LockFailed(lock_path) => PersistError::Locked(lock_path),
        Error::Io(source) => PersistError::Write {
            path: path.to_path_buf(),
            source,
        },
        other => PersistError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::other(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn key_paths_live_in_data_dir() {
        let storage = Storage::new("/tmp/simplr-data");
        assert_eq!(
            storage.key_path("work_tasks"),
            PathBuf::from("/tmp/simplr-data/work_tasks.json")
        );
        assert_eq!(storage.os_dir(), PathBuf::from("/tmp/simplr-data/os"));
    }

    #[test]
    fn missing_key_reads_as_none() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        assert!(storage.read_key("tasks").expect("read").is_none());
    }

    #[test]
    fn write_then_read_key() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        storage.write_key("filter", &vec!["active"]).expect("write");

        let bytes = storage.read_key("filter").expect("read").expect("present");
        let decoded: Vec<String> = serde_json::from_slice(&bytes).expect("decode");
        assert_eq!(decoded, vec!["active".to_string()]);
    }

    #[test]
    fn update_json_edits_under_one_lock() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::new(dir.path()).with_lock_timeout(50);
        let path = dir.path().join("os").join("counts.json");

        let len = storage
            .update_json(&path, |names: &mut Vec<String>| {
                names.push("a".to_string());
                names.len()
            })
            .expect("first edit");
        assert_eq!(len, 1);
        storage
            .update_json(&path, |names: &mut Vec<String>| names.push("b".to_string()))
            .expect("second edit");
        let stored: Option<Vec<String>> = storage.read_json(&path).expect("read");
        assert_eq!(stored, Some(vec!["a".to_string(), "b".to_string()]));

        let _held = lock::FileLock::acquire(lock::lock_path_for(&path), 50).expect("hold");
        let err = storage
            .update_json(&path, |names: &mut Vec<String>| names.clear())
            .expect_err("lock held");
        assert!(matches!(err, Error::LockFailed(_)));
    }
}

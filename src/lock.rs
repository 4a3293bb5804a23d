//! Advisory locks and atomic replace for files in the data directory.
//!
//! Collections are replaced whole: the new bytes go to a sibling temp file
//! which is renamed over the target while `<target>.lock` is held. Readers
//! take the same lock, so they see either the old or the new collection.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

/// How long a reader or writer waits for another process, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

const RETRY_EVERY: Duration = Duration::from_millis(25);

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Exclusive advisory lock on a `.lock` sidecar, released on drop.
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Wait up to `timeout_ms` for the lock.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_sidecar(path)?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if take(&file)? {
                return Ok(Self { file });
            }
            if Instant::now() >= deadline {
                tracing::debug!("gave up waiting for {}", path.display());
                return Err(Error::LockFailed(path.to_path_buf()));
            }
            std::thread::sleep(RETRY_EVERY);
        }
    }

    /// Single attempt; `None` while someone else holds it.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let file = open_sidecar(path.as_ref())?;
        Ok(take(&file)?.then_some(Self { file }))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open_sidecar(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// `Ok(false)` when the lock is held elsewhere.
fn take(file: &File) -> Result<bool> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(err) if contended(&err) => Ok(false),
        Err(err) => Err(Error::Io(err)),
    }
}

fn contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    // Sharing and lock violations on Windows.
    cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33))
}

pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    PathBuf::from(name)
}

/// Replace `path` with `data` via fsynced temp file and rename. Takes no lock.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path_for(path);
    let mut file = File::create(&temp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(err.into());
    }
    Ok(())
}

pub fn write_atomic_locked(path: impl AsRef<Path>, data: &[u8], timeout_ms: u64) -> Result<()> {
    let path = path.as_ref();
    let _guard = FileLock::acquire(lock_path_for(path), timeout_ms)?;
    write_atomic(path, data)
}

/// Missing files read as `None`.
pub fn read_locked(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Option<Vec<u8>>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let _guard = FileLock::acquire(lock_path_for(path), timeout_ms)?;
    Ok(Some(fs::read(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn held_lock_blocks_other_holders() {
        let dir = TempDir::new().unwrap();
        let sidecar = lock_path_for(&dir.path().join("tasks.json"));
        assert!(sidecar.ends_with("tasks.json.lock"));

        let guard = FileLock::acquire(&sidecar, 1000).unwrap();
        assert!(FileLock::try_acquire(&sidecar).unwrap().is_none());
        assert!(matches!(
            FileLock::acquire(&sidecar, 50),
            Err(Error::LockFailed(_))
        ));

        drop(guard);
        assert!(FileLock::try_acquire(&sidecar).unwrap().is_some());
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("categories.json");
        fs::create_dir(&target).unwrap();

        assert!(write_atomic(&target, b"[]").is_err());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_locked(dir.path().join("absent.json"), 100)
            .unwrap()
            .is_none());
    }

    #[test]
    fn racing_writers_leave_one_whole_collection() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("tasks.json");

        let writers = 6;
        let barrier = Arc::new(Barrier::new(writers));
        let payloads: Vec<String> = (0..writers)
            .map(|idx| format!("[{{\"id\":\"task-{idx}\",\"title\":\"{}\"}}]", "t".repeat(48)))
            .collect();

        let handles: Vec<_> = payloads
            .iter()
            .cloned()
            .map(|payload| {
                let barrier = Arc::clone(&barrier);
                let target = target.clone();
                thread::spawn(move || {
                    barrier.wait();
                    write_atomic_locked(&target, payload.as_bytes(), 2000).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let written = fs::read_to_string(&target).unwrap();
        assert!(payloads.contains(&written));
    }
}

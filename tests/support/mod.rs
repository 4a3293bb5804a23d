#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::Command;
use chrono::{DateTime, Utc};
use simplr::config::Config;
use simplr::orchestrator::{Backends, ManualClock, TaskOrchestrator};
use simplr::platform::memory::{MemoryBadge, MemoryReminders, MemorySearchIndex};
use simplr::profile::Profile;
use simplr::storage::Storage;
use tempfile::TempDir;

/// Temporary data directory for CLI tests.
pub struct TestData {
    dir: TempDir,
}

impl TestData {
    /// Fresh data directory with a short badge debounce so commands exit fast.
    pub fn init() -> Self {
        let data = Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        };
        data.write_config("[badge]\ndebounce_ms = 10\n")
            .expect("write config");
        data
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file("simplr.toml", contents)
    }

    pub fn read_json(&self, rel_path: &str) -> serde_json::Value {
        let raw = fs::read_to_string(self.dir.path().join(rel_path)).expect("read json file");
        serde_json::from_str(&raw).expect("parse json file")
    }

    /// `simplr` bound to this data directory.
    pub fn cmd(&self) -> Command {
        let mut cmd = simplr_cmd();
        cmd.env("SIMPLR_DATA_DIR", self.dir.path());
        cmd
    }
}

pub fn simplr_cmd() -> Command {
    let mut cmd = Command::cargo_bin("simplr").expect("binary");
    cmd.env_remove("SIMPLR_PROFILE")
        .env_remove("SIMPLR_DATA_DIR")
        .env_remove("RUST_LOG");
    cmd
}

/// Parse stdout of a `--json` invocation.
pub fn json_output(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("valid json envelope")
}

/// Orchestrator over a temp data dir with in-memory OS collaborators and a
/// manual clock.
pub struct Harness {
    pub dir: TempDir,
    pub storage: Storage,
    pub clock: Arc<ManualClock>,
    pub reminders: Arc<MemoryReminders>,
    pub search: Arc<MemorySearchIndex>,
    pub badge: Arc<MemoryBadge>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_reminders(now, MemoryReminders::new())
    }

    pub fn with_reminders(now: DateTime<Utc>, reminders: MemoryReminders) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let storage = Storage::new(dir.path());
        Self {
            dir,
            storage,
            clock: Arc::new(ManualClock::new(now)),
            reminders: Arc::new(reminders),
            search: Arc::new(MemorySearchIndex::new()),
            badge: Arc::new(MemoryBadge::new()),
        }
    }

    /// Give up on held storage locks after `timeout_ms` instead of seconds.
    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.storage = self.storage.clone().with_lock_timeout(timeout_ms);
        self
    }

    pub fn backends(&self) -> Backends {
        Backends {
            reminders: self.reminders.clone(),
            search: self.search.clone(),
            badge: self.badge.clone(),
        }
    }

    pub fn open(&self, profile: Profile) -> TaskOrchestrator {
        TaskOrchestrator::new(
            self.storage.clone(),
            Config::default(),
            profile,
            self.backends(),
            self.clock.clone(),
        )
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::badge::BadgeBackend;
use crate::error::{BadgeWriteError, IndexError, ScheduleError};
use crate::reminder::{ReminderBackend, ReminderRequest};
use crate::search::{SearchBackend, SearchItem};
use crate::storage::Storage;

pub const REMINDERS_FILE: &str = "reminders.json";
pub const SEARCH_INDEX_FILE: &str = "search-index.json";
pub const BADGE_FILE: &str = "badge.json";

fn read_map<T: serde::de::DeserializeOwned>(
    storage: &Storage,
    path: &PathBuf,
) -> BTreeMap<String, T> {
    match storage.read_json(path) {
        Ok(Some(map)) => map,
        Ok(None) => BTreeMap::new(),
        Err(err) => {
            tracing::warn!("cannot read {}, treating as empty: {err}", path.display());
            BTreeMap::new()
        }
    }
}

/// Pending reminders in `os/reminders.json`. Past fire dates are rejected.
#[derive(Debug, Clone)]
pub struct FileReminders {
    storage: Storage,
    path: PathBuf,
}

impl FileReminders {
    pub fn new(storage: Storage) -> Self {
        let path = storage.os_dir().join(REMINDERS_FILE);
        Self { storage, path }
    }

    pub fn pending(&self) -> Vec<ReminderRequest> {
        read_map::<ReminderRequest>(&self.storage, &self.path)
            .into_values()
            .collect()
    }

    fn update<R>(
        &self,
        edit: impl FnOnce(&mut BTreeMap<String, ReminderRequest>) -> R,
    ) -> crate::Result<R> {
        self.storage.update_json(&self.path, edit)
    }
}

impl ReminderBackend for FileReminders {
    fn schedule(&self, request: ReminderRequest) -> Result<(), ScheduleError> {
        if request.fire_at < Utc::now() {
            return Err(ScheduleError::PastFireDate {
                task_id: request.id,
                fire_at: request.fire_at.to_rfc3339(),
            });
        }
        let task_id = request.id.clone();
        self.update(|map| {
            map.insert(request.id.clone(), request);
        })
        .map_err(|err| ScheduleError::Rejected {
            task_id,
            reason: err.to_string(),
        })
    }

    fn cancel(&self, id: &str) {
        if !self.path.exists() {
            return;
        }
        if let Err(err) = self.update(|map| map.remove(id)) {
            tracing::warn!("cannot cancel reminder {id}: {err}");
        }
    }
}

/// Search index in `os/search-index.json`.
#[derive(Debug, Clone)]
pub struct FileSearchIndex {
    storage: Storage,
    path: PathBuf,
}

impl FileSearchIndex {
    pub fn new(storage: Storage) -> Self {
        let path = storage.os_dir().join(SEARCH_INDEX_FILE);
        Self { storage, path }
    }

    pub fn items(&self) -> Vec<SearchItem> {
        read_map::<SearchItem>(&self.storage, &self.path)
            .into_values()
            .collect()
    }

    fn update(
        &self,
        edit: impl FnOnce(&mut BTreeMap<String, SearchItem>),
    ) -> Result<(), IndexError> {
        self.storage
            .update_json(&self.path, edit)
            .map_err(|err| IndexError::Unavailable(err.to_string()))
    }
}

impl SearchBackend for FileSearchIndex {
    fn upsert(&self, items: Vec<SearchItem>) -> Result<(), IndexError> {
        self.update(|map| {
            for item in items {
                map.insert(item.id.clone(), item);
            }
        })
    }

    fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
        self.update(|map| {
            for id in ids {
                map.remove(id);
            }
        })
    }

    fn delete_domain(&self, domain: &str) -> Result<(), IndexError> {
        self.update(|map| map.retain(|_, item| item.domain != domain))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRecord {
    pub count: u32,
    pub updated_at: DateTime<Utc>,
}

/// App badge in `os/badge.json`.
#[derive(Debug, Clone)]
pub struct FileBadge {
    storage: Storage,
    path: PathBuf,
}

impl FileBadge {
    pub fn new(storage: Storage) -> Self {
        let path = storage.os_dir().join(BADGE_FILE);
        Self { storage, path }
    }

    pub fn current(&self) -> Option<BadgeRecord> {
        match self.storage.read_json(&self.path) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!("cannot read badge: {err}");
                None
            }
        }
    }
}

impl BadgeBackend for FileBadge {
    fn set_badge(&self, count: u32) -> Result<(), BadgeWriteError> {
        let record = BadgeRecord {
            count,
            updated_at: Utc::now(),
        };
        self.storage
            .write_json(&self.path, &record)
            .map_err(|err| BadgeWriteError::Failed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn request(id: &str, fire_at: DateTime<Utc>) -> ReminderRequest {
        ReminderRequest {
            id: id.to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            fire_at,
            repeats: false,
        }
    }

    #[test]
    fn reminders_survive_reopen_and_cancel() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        let fire_at = Utc::now() + Duration::hours(2);

        FileReminders::new(storage.clone())
            .schedule(request("t1", fire_at))
            .expect("schedule");
        let reopened = FileReminders::new(storage);
        assert_eq!(reopened.pending()[0].fire_at, fire_at);

        reopened.cancel("t1");
        reopened.cancel("never-scheduled");
        assert!(reopened.pending().is_empty());
    }

    #[test]
    fn past_reminders_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let reminders = FileReminders::new(Storage::new(dir.path()));
        let err = reminders
            .schedule(request("t1", Utc::now() - Duration::minutes(5)))
            .expect_err("past");
        assert_eq!(err.task_id(), "t1");
        assert!(reminders.pending().is_empty());
    }

    #[test]
    fn badge_keeps_last_value() {
        let dir = tempdir().expect("tempdir");
        let badge = FileBadge::new(Storage::new(dir.path()));
        assert!(badge.current().is_none());
        badge.set_badge(3).expect("write");
        badge.set_badge(1).expect("write");
        assert_eq!(badge.current().map(|record| record.count), Some(1));
    }

    #[test]
    fn concurrent_schedulers_keep_every_reminder() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        let fire_at = Utc::now() + Duration::hours(1);

        let handles: Vec<_> = (0..8)
            .map(|idx| {
                let reminders = FileReminders::new(storage.clone());
                std::thread::spawn(move || {
                    reminders
                        .schedule(request(&format!("t{idx}"), fire_at))
                        .expect("schedule");
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }

        assert_eq!(FileReminders::new(storage).pending().len(), 8);
    }
}

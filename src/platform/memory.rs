use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::badge::BadgeBackend;
use crate::error::{BadgeWriteError, IndexError, ScheduleError};
use crate::reminder::{ReminderBackend, ReminderRequest};
use crate::search::{SearchBackend, SearchItem};

/// Pending reminders kept in memory, keyed by task id.
#[derive(Debug, Default)]
pub struct MemoryReminders {
    pending: Mutex<BTreeMap<String, ReminderRequest>>,
    reject_before: Option<DateTime<Utc>>,
    cancels: Mutex<Vec<String>>,
}

impl MemoryReminders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject requests that would fire before `now`, like a real OS would.
    pub fn rejecting_past(now: DateTime<Utc>) -> Self {
        Self {
            reject_before: Some(now),
            ..Self::default()
        }
    }

    pub fn pending(&self) -> Vec<ReminderRequest> {
        self.pending.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<ReminderRequest> {
        self.pending.lock().get(id).cloned()
    }

    /// Every id passed to `cancel`, in call order.
    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().clone()
    }

    /// Deliver a reminder: it stops being pending.
    pub fn fire(&self, id: &str) -> Option<ReminderRequest> {
        self.pending.lock().remove(id)
    }
}

impl ReminderBackend for MemoryReminders {
    fn schedule(&self, request: ReminderRequest) -> Result<(), ScheduleError> {
        if let Some(now) = self.reject_before {
            if request.fire_at < now {
                return Err(ScheduleError::PastFireDate {
                    task_id: request.id,
                    fire_at: request.fire_at.to_rfc3339(),
                });
            }
        }
        self.pending.lock().insert(request.id.clone(), request);
        Ok(())
    }

    fn cancel(&self, id: &str) {
        self.cancels.lock().push(id.to_string());
        self.pending.lock().remove(id);
    }
}

#[derive(Debug, Default)]
struct IndexState {
    items: BTreeMap<String, SearchItem>,
    fail_next: usize,
    calls: usize,
}

/// Search index kept in memory. `fail_next(n)` makes the next `n` calls fail.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    state: Mutex<IndexState>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items ordered by id.
    pub fn items(&self) -> Vec<SearchItem> {
        self.state.lock().items.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<SearchItem> {
        self.state.lock().items.get(id).cloned()
    }

    pub fn fail_next(&self, calls: usize) {
        self.state.lock().fail_next = calls;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    fn guard(state: &mut IndexState) -> Result<(), IndexError> {
        state.calls += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(IndexError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl SearchBackend for MemorySearchIndex {
    fn upsert(&self, items: Vec<SearchItem>) -> Result<(), IndexError> {
        let mut state = self.state.lock();
        Self::guard(&mut state)?;
        for item in items {
            state.items.insert(item.id.clone(), item);
        }
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
        let mut state = self.state.lock();
        Self::guard(&mut state)?;
        for id in ids {
            state.items.remove(id);
        }
        Ok(())
    }

    fn delete_domain(&self, domain: &str) -> Result<(), IndexError> {
        let mut state = self.state.lock();
        Self::guard(&mut state)?;
        state.items.retain(|_, item| item.domain != domain);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BadgeState {
    writes: Vec<u32>,
    fail_next: usize,
    attempts: usize,
}

/// Badge that records every successful write.
#[derive(Debug, Default)]
pub struct MemoryBadge {
    state: Mutex<BadgeState>,
}

impl MemoryBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<u32> {
        self.state.lock().writes.clone()
    }

    pub fn current(&self) -> Option<u32> {
        self.state.lock().writes.last().copied()
    }

    /// Attempts including failed ones.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    pub fn fail_next(&self, writes: usize) {
        self.state.lock().fail_next = writes;
    }
}

impl BadgeBackend for MemoryBadge {
    fn set_badge(&self, count: u32) -> Result<(), BadgeWriteError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(BadgeWriteError::Failed("injected failure".to_string()));
        }
        state.writes.push(count);
        Ok(())
    }
}

//! Task records and the profile-scoped task store.
//!
//! The store owns the canonical ordered list for one profile. Order is
//! insertion / explicit reorder order and is never re-sorted. All mutations go
//! through [`TaskStore::apply`], which writes the new list before committing it
//! in memory, so a failed save leaves the previous good list in place.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, PersistError, Result};
use crate::profile::{Profile, ProfilePartition};
use crate::storage::Storage;

/// Checklist entry inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl ChecklistItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            completed: false,
        }
    }
}

/// Quick-list entry inside a task; tracks when it was ticked off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickListItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuickListItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            completed: false,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_reminder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub quick_list: Vec<QuickListItem>,
}

/// Where a task sits relative to "today" in the caller's time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DueStatus {
    Completed,
    Overdue,
    DueToday,
    Upcoming,
    NoDueDate,
}

impl Task {
    pub fn new(title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: String::new(),
            completed: false,
            due_date: None,
            has_reminder: false,
            reminder_date: None,
            created_at,
            completed_at: None,
            category_id: None,
            checklist: Vec::new(),
            quick_list: Vec::new(),
        }
    }

    /// Reminder fire time if the task currently wants one.
    pub fn wanted_reminder(&self) -> Option<DateTime<Utc>> {
        if self.completed || !self.has_reminder {
            return None;
        }
        self.reminder_date
    }

    /// Set completion and keep `completed_at` in lockstep.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed = completed;
        if completed {
            self.completed_at.get_or_insert(now);
        } else {
            self.completed_at = None;
        }
    }

    pub fn due_status<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DueStatus {
        if self.completed {
            return DueStatus::Completed;
        }
        let Some(due) = self.due_date else {
            return DueStatus::NoDueDate;
        };
        let today = now.date_naive();
        let due_day = due.with_timezone(&now.timezone()).date_naive();
        match due_day.cmp(&today) {
            std::cmp::Ordering::Less => DueStatus::Overdue,
            std::cmp::Ordering::Equal => DueStatus::DueToday,
            std::cmp::Ordering::Greater => DueStatus::Upcoming,
        }
    }

    /// Counts toward the badge: incomplete and due today, overdue, or undated.
    pub fn is_active<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        matches!(
            self.due_status(now),
            DueStatus::Overdue | DueStatus::DueToday | DueStatus::NoDueDate
        )
    }

    pub fn toggle_checklist_item(&mut self, item_id: &str) -> Result<bool> {
        let item = self
            .checklist
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| Error::InvalidArgument(format!("checklist item not found: {item_id}")))?;
        item.completed = !item.completed;
        Ok(item.completed)
    }

    pub fn toggle_quick_item(&mut self, item_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let item = self
            .quick_list
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| Error::InvalidArgument(format!("quick-list item not found: {item_id}")))?;
        item.completed = !item.completed;
        item.completed_at = if item.completed { Some(now) } else { None };
        Ok(item.completed)
    }

    /// Restore the model invariants after an arbitrary edit.
    fn normalize(&mut self, now: DateTime<Utc>) {
        self.title = self.title.trim().to_string();
        if self.completed {
            self.completed_at.get_or_insert(now);
        } else {
            self.completed_at = None;
        }
        if self.has_reminder && self.reminder_date.is_none() {
            self.has_reminder = false;
        }
        for item in &mut self.quick_list {
            if item.completed {
                item.completed_at.get_or_insert(now);
            } else {
                item.completed_at = None;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidArgument("task title cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Fields for a task about to be created.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_date: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
    pub checklist: Vec<String>,
    pub quick_list: Vec<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        let mut task = Task::new(self.title, now);
        task.description = self.description;
        task.due_date = self.due_date;
        task.has_reminder = self.reminder_date.is_some();
        task.reminder_date = self.reminder_date;
        task.category_id = self.category_id;
        task.checklist = self.checklist.into_iter().map(ChecklistItem::new).collect();
        task.quick_list = self.quick_list.into_iter().map(QuickListItem::new).collect();
        task
    }
}

/// Partial edit of an existing task. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub reminder_date: Option<Option<DateTime<Utc>>>,
    pub category_id: Option<Option<String>>,
    pub add_checklist: Vec<String>,
    pub add_quick_list: Vec<String>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.reminder_date.is_none()
            && self.category_id.is_none()
            && self.add_checklist.is_empty()
            && self.add_quick_list.is_empty()
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(reminder_date) = self.reminder_date {
            task.has_reminder = reminder_date.is_some();
            task.reminder_date = reminder_date;
        }
        if let Some(category_id) = self.category_id {
            task.category_id = category_id;
        }
        task.checklist
            .extend(self.add_checklist.into_iter().map(ChecklistItem::new));
        task.quick_list
            .extend(self.add_quick_list.into_iter().map(QuickListItem::new));
    }
}

/// A single store mutation.
#[derive(Debug, Clone)]
pub enum Mutation {
    Insert(Task),
    Update(Task),
    Delete(String),
    Reorder { from: usize, to: usize },
    ToggleCompletion(String),
}

/// One task before and after a mutation. Reorders touch no single task.
#[derive(Debug, Clone, Default)]
pub struct Change {
    pub previous: Option<Task>,
    pub current: Option<Task>,
}

impl Change {
    pub fn task_id(&self) -> Option<&str> {
        self.current
            .as_ref()
            .or(self.previous.as_ref())
            .map(|task| task.id.as_str())
    }
}

/// Result of applying a mutation: the touched task before and after, plus
/// the full list as committed.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub previous: Option<Task>,
    pub current: Option<Task>,
    pub snapshot: Vec<Task>,
}

/// Result of a batch applied under a single save.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub changes: Vec<Change>,
    pub snapshot: Vec<Task>,
}

/// Persisted list filter chosen for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListFilter {
    #[default]
    All,
    Active,
    Today,
    Completed,
}

impl ListFilter {
    pub fn matches<Tz: TimeZone>(&self, task: &Task, now: &DateTime<Tz>) -> bool {
        match self {
            ListFilter::All => true,
            ListFilter::Active => !task.completed,
            ListFilter::Today => matches!(
                task.due_status(now),
                DueStatus::DueToday | DueStatus::Overdue
            ),
            ListFilter::Completed => task.completed,
        }
    }
}

impl std::str::FromStr for ListFilter {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ListFilter::All),
            "active" => Ok(ListFilter::Active),
            "today" => Ok(ListFilter::Today),
            "completed" | "done" => Ok(ListFilter::Completed),
            other => Err(Error::InvalidArgument(format!(
                "invalid filter '{other}': must be all, active, today, or completed"
            ))),
        }
    }
}

pub fn encode_tasks(key: &str, tasks: &[Task]) -> std::result::Result<Vec<u8>, PersistError> {
    serde_json::to_vec(tasks).map_err(|source| PersistError::Encode {
        key: key.to_string(),
        source,
    })
}

pub fn decode_tasks(key: &str, bytes: &[u8]) -> std::result::Result<Vec<Task>, PersistError> {
    serde_json::from_slice(bytes).map_err(|source| PersistError::Decode {
        key: key.to_string(),
        source,
    })
}

/// Backfill `completed_at` for completed tasks written before it existed.
/// Returns how many tasks were repaired.
pub fn backfill_completed_at(tasks: &mut [Task]) -> usize {
    let mut repaired = 0;
    for task in tasks.iter_mut() {
        if task.completed && task.completed_at.is_none() {
            task.completed_at = Some(task.created_at);
            repaired += 1;
        }
    }
    repaired
}

/// Completed long enough ago to be purged by the retention sweep.
pub fn is_expired(task: &Task, now: DateTime<Utc>, window: chrono::Duration) -> bool {
    match (task.completed, task.completed_at) {
        (true, Some(completed_at)) => now - completed_at > window,
        _ => false,
    }
}

/// Ids of every task the retention sweep would purge.
pub fn expired_ids(tasks: &[Task], now: DateTime<Utc>, window: chrono::Duration) -> Vec<String> {
    tasks
        .iter()
        .filter(|task| is_expired(task, now, window))
        .map(|task| task.id.clone())
        .collect()
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    storage: Storage,
    profile: Profile,
    tasks: Vec<Task>,
    /// Last load could not read the file; saves are refused so the empty
    /// in-memory list never replaces it.
    unreadable: bool,
}

impl TaskStore {
    /// Open the store for `profile` and load its tasks.
    pub fn open(storage: Storage, profile: Profile) -> Self {
        let mut store = Self {
            storage,
            profile,
            tasks: Vec::new(),
            unreadable: false,
        };
        store.reload();
        store
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn key(&self) -> String {
        ProfilePartition::tasks_key(self.profile)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    /// `true` while the persisted list could not be read.
    pub fn is_unreadable(&self) -> bool {
        self.unreadable
    }

    /// Read the persisted list. Corrupt bytes are set aside and read as an
    /// empty list; a failed read (lock timeout, io) is an error.
    pub fn load(&self) -> std::result::Result<Vec<Task>, PersistError> {
        let key = self.key();
        let Some(bytes) = self.storage.read_key(&key)? else {
            return Ok(Vec::new());
        };

        let mut tasks = match decode_tasks(&key, &bytes) {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::warn!("{err}; starting with an empty task list");
                self.quarantine(&key, &bytes);
                return Ok(Vec::new());
            }
        };

        let repaired = backfill_completed_at(&mut tasks);
        if repaired > 0 {
            tracing::info!("backfilled completedAt for {repaired} task(s) in {key}");
            if let Err(err) = self.save(&tasks) {
                tracing::warn!("cannot persist completedAt backfill: {err}");
            }
        }
        Ok(tasks)
    }

    pub fn save(&self, tasks: &[Task]) -> std::result::Result<(), PersistError> {
        self.storage.write_key(&self.key(), tasks)
    }

    /// Re-read from disk, replacing the in-memory list. After a failed read
    /// the list is empty and mutations fail until a later reload succeeds.
    pub fn reload(&mut self) {
        match self.load() {
            Ok(tasks) => {
                self.tasks = tasks;
                self.unreadable = false;
            }
            Err(err) => {
                let key = self.key();
                tracing::warn!("cannot read {key}, saves disabled until it loads: {err}");
                self.copy_aside(&key);
                self.tasks = Vec::new();
                self.unreadable = true;
            }
        }
    }

    /// Apply a mutation, persist it, then commit it in memory.
    pub fn apply(&mut self, mutation: Mutation, now: DateTime<Utc>) -> Result<MutationOutcome> {
        let mut next = self.tasks.clone();
        let change = apply_to(&mut next, mutation, now)?;
        self.commit(next)?;
        Ok(MutationOutcome {
            previous: change.previous,
            current: change.current,
            snapshot: self.tasks.clone(),
        })
    }

    /// Apply several mutations with one save. Any failure leaves the store
    /// untouched.
    pub fn apply_batch(
        &mut self,
        mutations: Vec<Mutation>,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome> {
        let mut next = self.tasks.clone();
        let changes = mutations
            .into_iter()
            .map(|mutation| apply_to(&mut next, mutation, now))
            .collect::<Result<Vec<_>>>()?;
        if !changes.is_empty() {
            self.commit(next)?;
        }
        Ok(BatchOutcome {
            changes,
            snapshot: self.tasks.clone(),
        })
    }

    fn commit(&mut self, next: Vec<Task>) -> Result<()> {
        if self.unreadable {
            return Err(PersistError::Unreadable { key: self.key() }.into());
        }
        self.save(&next)?;
        self.tasks = next;
        Ok(())
    }

    fn quarantine(&self, key: &str, bytes: &[u8]) {
        let path = self.storage.key_path(&format!("{key}.corrupt"));
        if let Err(err) = crate::lock::write_atomic(&path, bytes) {
            tracing::warn!("cannot set aside corrupt {key}: {err}");
        }
    }

    /// Best-effort copy of a file that exists but could not be read.
    fn copy_aside(&self, key: &str) {
        let source = self.storage.key_path(key);
        if !source.is_file() {
            return;
        }
        let target = self.storage.key_path(&format!("{key}.corrupt"));
        if let Err(err) = std::fs::copy(&source, &target) {
            tracing::warn!("cannot set aside unreadable {key}: {err}");
        }
    }
}

fn apply_to(tasks: &mut Vec<Task>, mutation: Mutation, now: DateTime<Utc>) -> Result<Change> {
    let (previous, current) = match mutation {
        Mutation::Insert(mut task) => {
            task.validate()?;
            if tasks.iter().any(|existing| existing.id == task.id) {
                return Err(Error::InvalidArgument(format!(
                    "task already exists: {}",
                    task.id
                )));
            }
            task.normalize(now);
            tasks.push(task.clone());
            (None, Some(task))
        }
        Mutation::Update(mut task) => {
            task.validate()?;
            let slot = tasks
                .iter_mut()
                .find(|existing| existing.id == task.id)
                .ok_or_else(|| Error::TaskNotFound(task.id.clone()))?;
            task.created_at = slot.created_at;
            task.normalize(now);
            let previous = std::mem::replace(slot, task.clone());
            (Some(previous), Some(task))
        }
        Mutation::Delete(task_id) => {
            let index = position(tasks, &task_id)?;
            let removed = tasks.remove(index);
            (Some(removed), None)
        }
        Mutation::Reorder { from, to } => {
            if from >= tasks.len() || to >= tasks.len() {
                return Err(Error::InvalidArgument(format!(
                    "reorder out of range: {from} -> {to} (len {})",
                    tasks.len()
                )));
            }
            let task = tasks.remove(from);
            tasks.insert(to, task);
            (None, None)
        }
        Mutation::ToggleCompletion(task_id) => {
            let index = position(tasks, &task_id)?;
            let previous = tasks[index].clone();
            let toggled = !previous.completed;
            tasks[index].set_completed(toggled, now);
            (Some(previous), Some(tasks[index].clone()))
        }
    };
    Ok(Change { previous, current })
}

fn position(tasks: &[Task], task_id: &str) -> Result<usize> {
    tasks
        .iter()
        .position(|task| task.id == task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
}

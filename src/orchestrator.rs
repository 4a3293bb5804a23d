//! Composition root: the one place task mutations enter.
//!
//! Every operation applies its change to the [`TaskStore`] first. Only after
//! the store has committed does it fan out, in order:
//!
//! 1. reminder transition, inline (warnings are returned, never raised)
//! 2. search index update, queued on the ordered index worker
//! 3. debounced badge request with the committed snapshot
//!
//! A store failure returns early, so nothing fans out for a change that was
//! not persisted. Mutations take `&mut self`; the owner serializes them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::badge::{BadgeBackend, BadgeCounter};
use crate::category::{Category, CategoryStore, RepairReport};
use crate::config::Config;
use crate::error::{Error, Result, ScheduleError};
use crate::events::{Event, EventBus, EventKind};
use crate::platform::file::{FileBadge, FileReminders, FileSearchIndex};
use crate::profile::{self, Profile, ProfilePartition};
use crate::reminder::{plan_reminder, ReminderBackend, ReminderScheduler};
use crate::search::{IndexerHandle, SearchBackend, SearchIndexer};
use crate::storage::Storage;
use crate::task::{
    expired_ids, Change, ListFilter, Mutation, NewTask, Task, TaskEdit, TaskStore,
};

/// Source of "now" for mutations and index timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// The three OS collaborators.
#[derive(Clone)]
pub struct Backends {
    pub reminders: Arc<dyn ReminderBackend>,
    pub search: Arc<dyn SearchBackend>,
    pub badge: Arc<dyn BadgeBackend>,
}

impl Backends {
    /// File-backed collaborators under `<data_dir>/os/`.
    pub fn file(storage: &Storage) -> Self {
        Self {
            reminders: Arc::new(FileReminders::new(storage.clone())),
            search: Arc::new(FileSearchIndex::new(storage.clone())),
            badge: Arc::new(FileBadge::new(storage.clone())),
        }
    }
}

/// Host lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foreground,
    Background,
    LowMemory,
}

/// Outcome of a single-task operation.
#[derive(Debug, Clone, Default)]
pub struct MutationReport {
    /// Task after the change; `None` for deletes and reorders.
    pub task: Option<Task>,
    /// Reminder requests the OS refused. The mutation itself succeeded.
    pub warnings: Vec<ScheduleError>,
}

/// Outcome of an operation touching several tasks.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub tasks: Vec<Task>,
    pub warnings: Vec<ScheduleError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub removed: Vec<String>,
}

pub struct TaskOrchestrator {
    storage: Storage,
    config: Config,
    profile: Profile,
    clock: Arc<dyn Clock>,
    store: TaskStore,
    categories: CategoryStore,
    reminders: ReminderScheduler,
    indexer: IndexerHandle,
    badge: BadgeCounter,
    events: EventBus,
}

impl TaskOrchestrator {
    /// Open `profile` and wire up the collaborators. Spawns the index worker,
    /// so this must run inside a tokio runtime.
    pub fn new(
        storage: Storage,
        config: Config,
        profile: Profile,
        backends: Backends,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = TaskStore::open(storage.clone(), profile);
        let categories =
            CategoryStore::open(storage.clone(), profile, config.categories.cache_ttl());
        let reminders =
            ReminderScheduler::new(backends.reminders, config.reminders.default_body.clone());
        let indexer = IndexerHandle::spawn(SearchIndexer::new(
            backends.search,
            config.search.domain.clone(),
            config.search.completed_expiration(),
        ));
        let badge = BadgeCounter::new(backends.badge, &config.badge);

        tracing::debug!(
            "opened profile {profile} with {} task(s) from {}",
            store.tasks().len(),
            storage.data_dir().display()
        );

        Self {
            storage,
            config,
            profile,
            clock,
            store,
            categories,
            reminders,
            indexer,
            badge,
            events: EventBus::new(),
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Current ordered task list.
    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn task(&self, task_id: &str) -> Result<&Task> {
        self.store
            .get(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    pub fn categories(&self) -> &[Category] {
        self.categories.categories()
    }

    /// Category for `id`, or the "uncategorized" placeholder.
    pub fn resolve_category(&mut self, id: Option<&str>) -> Category {
        self.categories.resolve(id)
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    /// The OS delivered the reminder for `task_id`.
    pub fn reminder_fired(&mut self, task_id: &str) {
        self.reminders.mark_fired(task_id);
    }

    // =========================================================================
    // Task operations
    // =========================================================================

    pub fn create(&mut self, new_task: NewTask) -> Result<MutationReport> {
        let now = self.now();
        self.apply_one(Mutation::Insert(new_task.into_task(now)), EventKind::TaskCreated)
    }

    /// Replace a task wholesale. `created_at` is kept from the stored copy.
    pub fn update(&mut self, task: Task) -> Result<MutationReport> {
        self.apply_one(Mutation::Update(task), EventKind::TaskUpdated)
    }

    pub fn edit(&mut self, task_id: &str, edit: TaskEdit) -> Result<MutationReport> {
        if let Some(Some(category_id)) = &edit.category_id {
            self.ensure_category(category_id)?;
        }
        let mut task = self.task(task_id)?.clone();
        edit.apply(&mut task);
        self.update(task)
    }

    pub fn delete(&mut self, task_id: &str) -> Result<MutationReport> {
        self.apply_one(Mutation::Delete(task_id.to_string()), EventKind::TaskDeleted)
    }

    pub fn toggle_completion(&mut self, task_id: &str) -> Result<MutationReport> {
        let kind = if self.task(task_id)?.completed {
            EventKind::TaskReopened
        } else {
            EventKind::TaskCompleted
        };
        self.apply_one(Mutation::ToggleCompletion(task_id.to_string()), kind)
    }

    /// Toggle only if the task is not already in the requested state.
    pub fn set_completed(&mut self, task_id: &str, completed: bool) -> Result<MutationReport> {
        let task = self.task(task_id)?;
        if task.completed == completed {
            return Ok(MutationReport {
                task: Some(task.clone()),
                warnings: Vec::new(),
            });
        }
        self.toggle_completion(task_id)
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> Result<MutationReport> {
        self.apply_one(Mutation::Reorder { from, to }, EventKind::TasksReordered)
    }

    pub fn toggle_checklist_item(&mut self, task_id: &str, item_id: &str) -> Result<MutationReport> {
        let mut task = self.task(task_id)?.clone();
        task.toggle_checklist_item(item_id)?;
        self.update(task)
    }

    pub fn toggle_quick_item(&mut self, task_id: &str, item_id: &str) -> Result<MutationReport> {
        let now = self.now();
        let mut task = self.task(task_id)?.clone();
        task.toggle_quick_item(item_id, now)?;
        self.update(task)
    }

    /// Point every task in `task_ids` at `category_id` (or clear it) in one save.
    pub fn assign_category(
        &mut self,
        task_ids: &[String],
        category_id: Option<&str>,
    ) -> Result<BatchReport> {
        if let Some(category_id) = category_id {
            self.ensure_category(category_id)?;
        }
        let mutations = task_ids
            .iter()
            .map(|task_id| {
                let mut task = self.task(task_id)?.clone();
                task.category_id = category_id.map(str::to_string);
                Ok(Mutation::Update(task))
            })
            .collect::<Result<Vec<_>>>()?;

        let outcome = self.store.apply_batch(mutations, self.clock.now())?;
        let warnings = self.fan_out(&outcome.changes, outcome.snapshot);
        for change in &outcome.changes {
            self.publish_change(EventKind::TaskUpdated, change);
        }
        Ok(BatchReport {
            tasks: outcome.changes.into_iter().filter_map(|change| change.current).collect(),
            warnings,
        })
    }

    /// Purge completed tasks older than the retention window.
    pub fn run_maintenance(&mut self) -> Result<MaintenanceReport> {
        let now = self.now();
        let removed = expired_ids(self.store.tasks(), now, self.config.retention.window());
        if removed.is_empty() {
            tracing::debug!("retention sweep: nothing expired");
            return Ok(MaintenanceReport::default());
        }

        let mutations = removed.iter().cloned().map(Mutation::Delete).collect();
        let outcome = self.store.apply_batch(mutations, now)?;
        self.fan_out(&outcome.changes, outcome.snapshot);
        tracing::info!("retention sweep removed {} task(s)", removed.len());
        self.publish(
            EventKind::MaintenanceRan,
            serde_json::json!({ "removed": removed }),
        );
        Ok(MaintenanceReport { removed })
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub fn add_category(&mut self, name: &str, color: &str) -> Result<Category> {
        let category = self.categories.add(name, color)?;
        self.after_category_change("added", &category);
        Ok(category)
    }

    pub fn update_category(
        &mut self,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<Category> {
        let category = self.categories.update(id, name, color)?;
        self.after_category_change("updated", &category);
        Ok(category)
    }

    pub fn delete_category(&mut self, id: &str) -> Result<Category> {
        let category = self.categories.delete(id)?;
        self.after_category_change("deleted", &category);
        Ok(category)
    }

    /// Restore well-known built-in ids and rewrite the tasks that used the
    /// regenerated ones. Tasks are saved before the categories, so a failed
    /// save leaves every stored reference resolvable.
    pub fn repair_categories(&mut self) -> Result<RepairReport> {
        let mut tasks = self.store.tasks().to_vec();
        let (repaired, report) = self.categories.plan_repair(&mut tasks);
        if report.categories_fixed == 0 {
            return Ok(report);
        }

        let mutations: Vec<Mutation> = tasks
            .into_iter()
            .zip(self.store.tasks())
            .filter(|(fixed, stored)| fixed.category_id != stored.category_id)
            .map(|(fixed, _)| Mutation::Update(fixed))
            .collect();
        let outcome = self.store.apply_batch(mutations, self.clock.now())?;
        self.categories.commit_repair(repaired)?;
        self.fan_out(&outcome.changes, outcome.snapshot);

        tracing::info!(
            "repaired {} categor(ies), rewrote {} task(s)",
            report.categories_fixed,
            report.tasks_rewritten
        );
        self.publish(EventKind::CategoryChanged, serde_json::to_value(&report)?);
        Ok(report)
    }

    // =========================================================================
    // Profiles and lifecycle
    // =========================================================================

    /// Persist `profile` as active and swap every collection over to it.
    /// Pending reminders of the previous profile stay scheduled.
    pub async fn switch_profile(&mut self, profile: Profile) -> Result<bool> {
        if profile == self.profile {
            return Ok(false);
        }
        profile::persist_profile(&self.storage, profile)?;

        let previous = self.profile;
        self.profile = profile;
        self.store = TaskStore::open(self.storage.clone(), profile);
        self.categories = CategoryStore::open(
            self.storage.clone(),
            profile,
            self.config.categories.cache_ttl(),
        );
        self.reindex_all();
        self.badge.invalidate_cache();
        self.badge
            .request_update_immediate(self.store.tasks(), self.clock.now())
            .await;

        tracing::info!("switched profile {previous} -> {profile}");
        self.publish(
            EventKind::ProfileSwitched,
            serde_json::json!({ "previous": previous, "current": profile }),
        );
        Ok(true)
    }

    pub async fn handle_lifecycle(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Foreground => {
                self.categories.refresh();
                if self.store.is_unreadable() {
                    self.store.reload();
                    if !self.store.is_unreadable() {
                        tracing::info!("{} readable again", self.store.key());
                        self.reindex_all();
                        self.badge.invalidate_cache();
                    }
                }
                self.refresh_badge().await;
            }
            LifecycleEvent::Background | LifecycleEvent::LowMemory => {
                self.badge.invalidate_cache();
                self.categories.invalidate_cache();
            }
        }
    }

    /// Recompute the badge from persisted tasks (cached for the badge TTL).
    pub async fn refresh_badge(&self) -> u32 {
        let store = &self.store;
        let load = || {
            store.load().unwrap_or_else(|err| {
                tracing::warn!("badge refresh falling back to loaded tasks: {err}");
                store.tasks().to_vec()
            })
        };
        self.badge.refresh_from_store(load, self.clock.now()).await
    }

    /// Cancel any pending debounced write and write the current count.
    pub async fn update_badge_now(&self) -> u32 {
        self.badge
            .request_update_immediate(self.store.tasks(), self.clock.now())
            .await
    }

    /// Queue a full rebuild of the search index from the current list.
    pub fn reindex_all(&self) {
        let categories: Arc<[Category]> = Arc::from(self.categories.categories());
        self.indexer
            .index_all(self.store.tasks().to_vec(), categories, self.clock.now());
    }

    /// Wait for queued index work and any pending badge write.
    pub async fn settle(&self) {
        self.indexer.flush().await;
        self.badge.settle().await;
    }

    // =========================================================================
    // Persisted list filter
    // =========================================================================

    pub fn filter(&self) -> ListFilter {
        let key = ProfilePartition::filter_key(self.profile);
        match self.storage.read_key(&key) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::warn!("ignoring unreadable {key}: {err}");
                ListFilter::default()
            }),
            Ok(None) => ListFilter::default(),
            Err(err) => {
                tracing::warn!("cannot read {key}: {err}");
                ListFilter::default()
            }
        }
    }

    pub fn set_filter(&self, filter: ListFilter) -> Result<()> {
        let key = ProfilePartition::filter_key(self.profile);
        self.storage.write_key(&key, &filter)?;
        Ok(())
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    fn apply_one(&mut self, mutation: Mutation, kind: EventKind) -> Result<MutationReport> {
        let outcome = self.store.apply(mutation, self.clock.now())?;
        let change = Change {
            previous: outcome.previous,
            current: outcome.current,
        };
        let warnings = self.fan_out(std::slice::from_ref(&change), outcome.snapshot);
        self.publish_change(kind, &change);
        Ok(MutationReport {
            task: change.current,
            warnings,
        })
    }

    fn fan_out(&mut self, changes: &[Change], snapshot: Vec<Task>) -> Vec<ScheduleError> {
        let now = self.clock.now();
        let categories: Arc<[Category]> = Arc::from(self.categories.categories());
        let mut warnings = Vec::new();

        for change in changes {
            let Some(task_id) = change.task_id() else {
                continue;
            };
            let plan = plan_reminder(change.previous.as_ref(), change.current.as_ref());
            if let Some(warning) = self.reminders.apply(task_id, change.current.as_ref(), plan) {
                warnings.push(warning);
            }
            match &change.current {
                Some(task) => self.indexer.index_one(task.clone(), categories.clone(), now),
                None => self.indexer.remove(task_id),
            }
        }

        self.badge.request_update(snapshot, now);
        warnings
    }

    fn after_category_change(&mut self, action: &str, category: &Category) {
        tracing::debug!("category {} {action}", category.id);
        self.reindex_all();
        self.publish(
            EventKind::CategoryChanged,
            serde_json::json!({ "action": action, "category": category }),
        );
    }

    fn ensure_category(&mut self, category_id: &str) -> Result<()> {
        match self.categories.lookup(category_id) {
            Some(_) => Ok(()),
            None => Err(Error::CategoryNotFound(category_id.to_string())),
        }
    }

    fn publish_change(&self, kind: EventKind, change: &Change) {
        let data = match (&change.current, &change.previous) {
            (Some(task), _) | (None, Some(task)) => {
                serde_json::json!({ "task_id": task.id, "title": task.title })
            }
            (None, None) => serde_json::json!({ "task_count": self.store.tasks().len() }),
        };
        self.publish(kind, data);
    }

    fn publish(&self, kind: EventKind, data: serde_json::Value) {
        let mut event = Event::new(kind, self.profile, self.clock.now());
        event.data = Some(data);
        self.events.publish(event);
    }
}

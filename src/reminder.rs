//! Reminder scheduling: one pending OS reminder per task id.
//!
//! The orchestrator derives a [`ReminderPlan`] from the task before and after
//! each mutation and hands it to [`ReminderScheduler::apply`]. Calls are made
//! inline, in mutation order, so a later cancel can never be overtaken by an
//! earlier schedule for the same id.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::task::Task;

/// What the OS reminder API receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub id: String,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub repeats: bool,
}

/// OS reminder API. Scheduling an existing id replaces it; cancelling an
/// unknown id is a no-op.
pub trait ReminderBackend: Send + Sync {
    fn schedule(&self, request: ReminderRequest) -> Result<(), ScheduleError>;
    fn cancel(&self, id: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReminderState {
    NoReminder,
    Scheduled { fire_at: DateTime<Utc> },
}

/// Reminder transition for one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderPlan {
    /// Cancel whatever is pending, then schedule at `fire_at`.
    Schedule { fire_at: DateTime<Utc> },
    /// Cancel unconditionally (completion, delete, reminder switched off).
    Cancel,
    /// Task wants no reminder and never had one; only clear stale state.
    NoReminder,
}

/// Derive the reminder transition from the task before and after a mutation.
pub fn plan_reminder(previous: Option<&Task>, current: Option<&Task>) -> ReminderPlan {
    let Some(current) = current else {
        return ReminderPlan::Cancel;
    };
    if current.completed {
        return ReminderPlan::Cancel;
    }
    if let Some(fire_at) = current.wanted_reminder() {
        return ReminderPlan::Schedule { fire_at };
    }
    match previous {
        Some(previous) if previous.has_reminder => ReminderPlan::Cancel,
        _ => ReminderPlan::NoReminder,
    }
}

pub struct ReminderScheduler {
    backend: Arc<dyn ReminderBackend>,
    scheduled: BTreeMap<String, DateTime<Utc>>,
    default_body: String,
}

impl ReminderScheduler {
    pub fn new(backend: Arc<dyn ReminderBackend>, default_body: impl Into<String>) -> Self {
        Self {
            backend,
            scheduled: BTreeMap::new(),
            default_body: default_body.into(),
        }
    }

    /// Replace any pending reminder for `task_id` with one at `fire_at`.
    pub fn schedule(
        &mut self,
        task_id: &str,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        self.cancel(task_id);
        let request = ReminderRequest {
            id: task_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            fire_at,
            repeats: false,
        };
        self.backend.schedule(request)?;
        self.scheduled.insert(task_id.to_string(), fire_at);
        tracing::debug!("reminder scheduled for {task_id} at {fire_at}");
        Ok(())
    }

    pub fn cancel(&mut self, task_id: &str) {
        self.backend.cancel(task_id);
        if self.scheduled.remove(task_id).is_some() {
            tracing::debug!("reminder cancelled for {task_id}");
        }
    }

    /// The OS delivered the reminder; nothing is pending for the id anymore.
    pub fn mark_fired(&mut self, task_id: &str) {
        self.scheduled.remove(task_id);
    }

    pub fn state(&self, task_id: &str) -> ReminderState {
        match self.scheduled.get(task_id) {
            Some(fire_at) => ReminderState::Scheduled { fire_at: *fire_at },
            None => ReminderState::NoReminder,
        }
    }

    pub fn pending(&self) -> Vec<(String, DateTime<Utc>)> {
        self.scheduled
            .iter()
            .map(|(id, fire_at)| (id.clone(), *fire_at))
            .collect()
    }

    /// Execute `plan` for `task_id`. Backend rejections come back as warnings.
    pub fn apply(
        &mut self,
        task_id: &str,
        task: Option<&Task>,
        plan: ReminderPlan,
    ) -> Option<ScheduleError> {
        match plan {
            ReminderPlan::Cancel => {
                self.cancel(task_id);
                None
            }
            ReminderPlan::NoReminder => {
                if self.scheduled.contains_key(task_id) {
                    self.cancel(task_id);
                }
                None
            }
            ReminderPlan::Schedule { fire_at } => {
                let (title, body) = match task {
                    Some(task) if !task.description.trim().is_empty() => {
                        (task.title.as_str(), task.description.as_str())
                    }
                    Some(task) => (task.title.as_str(), self.default_body.as_str()),
                    None => return None,
                };
                let title = title.to_string();
                let body = body.to_string();
                match self.schedule(task_id, &title, &body, fire_at) {
                    Ok(()) => None,
                    Err(err) => {
                        tracing::warn!("{err}");
                        Some(err)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryReminders;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, hour, 0, 0).unwrap()
    }

    fn with_reminder(fire_at: DateTime<Utc>) -> Task {
        let mut task = Task::new("Call dentist", at(8));
        task.has_reminder = true;
        task.reminder_date = Some(fire_at);
        task
    }

    #[test]
    fn plan_follows_transition_table() {
        let task = with_reminder(at(15));
        assert_eq!(
            plan_reminder(None, Some(&task)),
            ReminderPlan::Schedule { fire_at: at(15) }
        );

        let mut off = task.clone();
        off.has_reminder = false;
        assert_eq!(plan_reminder(Some(&task), Some(&off)), ReminderPlan::Cancel);
        assert_eq!(plan_reminder(None, Some(&off)), ReminderPlan::NoReminder);

        let mut done = task.clone();
        done.set_completed(true, at(9));
        assert_eq!(plan_reminder(Some(&task), Some(&done)), ReminderPlan::Cancel);

        let mut done_without = off.clone();
        done_without.set_completed(true, at(9));
        assert_eq!(plan_reminder(Some(&off), Some(&done_without)), ReminderPlan::Cancel);

        assert_eq!(
            plan_reminder(Some(&done), Some(&task)),
            ReminderPlan::Schedule { fire_at: at(15) }
        );
        assert_eq!(plan_reminder(Some(&task), None), ReminderPlan::Cancel);
    }

    #[test]
    fn rescheduling_replaces_prior_entry() {
        let backend = Arc::new(MemoryReminders::new());
        let mut scheduler = ReminderScheduler::new(backend.clone(), "Reminder");

        scheduler.schedule("t1", "A", "body", at(10)).expect("schedule");
        scheduler.schedule("t1", "A", "body", at(11)).expect("schedule");

        let pending = backend.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fire_at, at(11));
        assert_eq!(scheduler.state("t1"), ReminderState::Scheduled { fire_at: at(11) });
    }

    #[test]
    fn rejected_past_date_is_a_warning_not_state() {
        let backend = Arc::new(MemoryReminders::rejecting_past(at(12)));
        let mut scheduler = ReminderScheduler::new(backend.clone(), "Reminder");
        let task = with_reminder(at(12) - Duration::hours(1));

        let warning = scheduler.apply(
            &task.id,
            Some(&task),
            ReminderPlan::Schedule { fire_at: at(11) },
        );
        assert!(matches!(warning, Some(ScheduleError::PastFireDate { .. })));
        assert_eq!(scheduler.state(&task.id), ReminderState::NoReminder);
        assert!(backend.pending().is_empty());
    }

    #[test]
    fn empty_description_uses_default_body() {
        let backend = Arc::new(MemoryReminders::new());
        let mut scheduler = ReminderScheduler::new(backend.clone(), "Due soon");
        let task = with_reminder(at(15));

        scheduler.apply(&task.id, Some(&task), plan_reminder(None, Some(&task)));
        assert_eq!(backend.pending()[0].body, "Due soon");
    }

    #[test]
    fn fired_reminder_returns_to_no_reminder() {
        let backend = Arc::new(MemoryReminders::new());
        let mut scheduler = ReminderScheduler::new(backend, "Reminder");
        scheduler.schedule("t1", "A", "b", at(10)).expect("schedule");
        scheduler.mark_fired("t1");
        assert_eq!(scheduler.state("t1"), ReminderState::NoReminder);
        assert!(scheduler.pending().is_empty());
    }
}

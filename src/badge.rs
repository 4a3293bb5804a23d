//! App badge: number of incomplete tasks that are due today, overdue, or
//! undated.
//!
//! Requests are debounced: each `request_update` aborts the previous pending
//! one, so a burst of mutations produces a single write carrying the latest
//! snapshot. The backend is only called when the value differs from the last
//! successful write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::BadgeConfig;
use crate::error::BadgeWriteError;
use crate::task::Task;

/// OS badge API.
pub trait BadgeBackend: Send + Sync {
    fn set_badge(&self, count: u32) -> Result<(), BadgeWriteError>;
}

/// Badge value for `tasks` as of `now`, using calendar days in `now`'s zone.
pub fn active_count<Tz: TimeZone>(tasks: &[Task], now: &DateTime<Tz>) -> u32 {
    let count = tasks.iter().filter(|task| task.is_active(now)).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[derive(Default)]
struct BadgeState {
    pending: Option<JoinHandle<()>>,
    cached: Option<(u32, Instant)>,
    last_written: Option<u32>,
}

struct Inner {
    backend: Arc<dyn BadgeBackend>,
    debounce: Duration,
    cache_ttl: Duration,
    retry_delay: Duration,
    state: Mutex<BadgeState>,
    write_lock: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct BadgeCounter {
    inner: Arc<Inner>,
}

impl BadgeCounter {
    pub fn new(backend: Arc<dyn BadgeBackend>, config: &BadgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                debounce: config.debounce(),
                cache_ttl: config.cache_ttl(),
                retry_delay: config.retry_delay(),
                state: Mutex::new(BadgeState::default()),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Schedule a debounced write for `snapshot` as of `now`, replacing any
    /// pending one. Must be called inside a tokio runtime.
    pub fn request_update(&self, snapshot: Vec<Task>, now: DateTime<Utc>) {
        let inner = self.inner.clone();
        let mut state = self.inner.state.lock();
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            let count = active_count(&snapshot, &now.with_timezone(&Local));
            inner.remember(count);
            inner.write(count).await;
        }));
    }

    /// Cancel any pending write and write `snapshot`'s count now.
    pub async fn request_update_immediate(&self, snapshot: &[Task], now: DateTime<Utc>) -> u32 {
        self.cancel_pending();
        let count = active_count(snapshot, &now.with_timezone(&Local));
        self.inner.remember(count);
        self.inner.write(count).await;
        count
    }

    /// Write the count from persisted tasks, reusing the cached count while it
    /// is younger than the TTL.
    pub async fn refresh_from_store<F>(&self, load: F, now: DateTime<Utc>) -> u32
    where
        F: FnOnce() -> Vec<Task>,
    {
        let cached = {
            let state = self.inner.state.lock();
            state
                .cached
                .filter(|(_, at)| at.elapsed() < self.inner.cache_ttl)
                .map(|(count, _)| count)
        };
        let count = match cached {
            Some(count) => count,
            None => {
                let count = active_count(&load(), &now.with_timezone(&Local));
                self.inner.remember(count);
                count
            }
        };
        self.inner.write(count).await;
        count
    }

    pub fn invalidate_cache(&self) {
        self.inner.state.lock().cached = None;
    }

    /// Last value the backend accepted.
    pub fn last_written(&self) -> Option<u32> {
        self.inner.state.lock().last_written
    }

    /// Wait for the pending debounced write, if any, to finish.
    pub async fn settle(&self) {
        let pending = self.inner.state.lock().pending.take();
        if let Some(handle) = pending {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!("badge update task failed: {err}");
                }
            }
        }
    }

    fn cancel_pending(&self) {
        if let Some(previous) = self.inner.state.lock().pending.take() {
            previous.abort();
        }
    }
}

impl Inner {
    async fn write(&self, count: u32) {
        let _serial = self.write_lock.lock().await;
        if self.state.lock().last_written == Some(count) {
            tracing::trace!("badge already at {count}");
            return;
        }

        let mut result = self.backend.set_badge(count);
        if let Err(err) = &result {
            tracing::debug!("badge write failed, retrying once: {err}");
            tokio::time::sleep(self.retry_delay).await;
            result = self.backend.set_badge(count);
        }

        match result {
            Ok(()) => {
                tracing::debug!("badge set to {count}");
                self.state.lock().last_written = Some(count);
            }
            Err(err) => tracing::warn!("badge update to {count} dropped: {err}"),
        }
    }

    fn remember(&self, count: u32) {
        self.state.lock().cached = Some((count, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryBadge;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn open_tasks(count: usize) -> Vec<Task> {
        (0..count)
            .map(|index| Task::new(format!("task {index}"), Utc::now()))
            .collect()
    }

    fn counter(backend: Arc<MemoryBadge>) -> BadgeCounter {
        BadgeCounter::new(backend, &BadgeConfig::default())
    }

    #[test]
    fn count_includes_overdue_today_and_undated_only() {
        let now = Local::now();
        let utc = now.with_timezone(&Utc);
        let mut overdue = Task::new("overdue", utc);
        overdue.due_date = Some(utc - ChronoDuration::days(2));
        let mut today = Task::new("today", utc);
        today.due_date = Some(utc);
        let undated = Task::new("undated", utc);
        let mut future = Task::new("future", utc);
        future.due_date = Some(utc + ChronoDuration::days(3));
        let mut done = Task::new("done", utc);
        done.set_completed(true, utc);

        let tasks = vec![overdue, today, undated, future, done];
        assert_eq!(active_count(&tasks, &now), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_one_write_with_latest_snapshot() {
        let backend = Arc::new(MemoryBadge::new());
        let badge = counter(backend.clone());

        for size in 1..=5 {
            badge.request_update(open_tasks(size), Utc::now());
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(backend.writes().is_empty());

        badge.settle().await;
        assert_eq!(backend.writes(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_value_is_not_rewritten() {
        let backend = Arc::new(MemoryBadge::new());
        let badge = counter(backend.clone());

        badge.request_update(open_tasks(2), Utc::now());
        badge.settle().await;
        badge.request_update(open_tasks(2), Utc::now());
        badge.settle().await;
        assert_eq!(backend.writes(), vec![2]);
        assert_eq!(backend.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_retried_once() {
        let backend = Arc::new(MemoryBadge::new());
        let badge = counter(backend.clone());

        backend.fail_next(1);
        assert_eq!(badge.request_update_immediate(&open_tasks(4), Utc::now()).await, 4);
        assert_eq!(backend.writes(), vec![4]);
        assert_eq!(backend.attempts(), 2);

        backend.fail_next(2);
        badge.request_update_immediate(&open_tasks(1), Utc::now()).await;
        assert_eq!(backend.writes(), vec![4]);
        assert_eq!(badge.last_written(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_update_cancels_pending_write() {
        let backend = Arc::new(MemoryBadge::new());
        let badge = counter(backend.clone());

        badge.request_update(open_tasks(7), Utc::now());
        badge.request_update_immediate(&open_tasks(3), Utc::now()).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.writes(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_reuses_cached_count_until_ttl() {
        let backend = Arc::new(MemoryBadge::new());
        let badge = counter(backend.clone());
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            open_tasks(2)
        };

        assert_eq!(badge.refresh_from_store(load, Utc::now()).await, 2);
        assert_eq!(badge.refresh_from_store(load, Utc::now()).await, 2);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        badge.refresh_from_store(load, Utc::now()).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        badge.invalidate_cache();
        badge.refresh_from_store(load, Utc::now()).await;
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(backend.writes(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn count_uses_the_given_time_not_the_wall_clock() {
        let backend = Arc::new(MemoryBadge::new());
        let badge = counter(backend.clone());
        let pinned = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
        let mut upcoming = Task::new("upcoming", pinned);
        upcoming.due_date = Some(pinned + ChronoDuration::days(2));

        badge.request_update(vec![upcoming.clone()], pinned);
        badge.settle().await;
        assert_eq!(backend.writes(), vec![0]);

        let later = pinned + ChronoDuration::days(3);
        assert_eq!(badge.request_update_immediate(&[upcoming], later).await, 1);
        assert_eq!(backend.writes(), vec![0, 1]);
    }
}

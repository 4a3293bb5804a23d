//! Searchable projection of tasks for system-wide lookup.
//!
//! The index is best-effort: failures are logged and retried only by the next
//! full [`SearchIndexer::index_all`]. Operations run on one worker task fed by
//! an ordered queue, so updates for a given task id land in mutation order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::category::{uncategorized, Category};
use crate::error::IndexError;
use crate::task::{DueStatus, Task};

/// Ranking ordinal; higher ranks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceHint {
    Completed = 0,
    Default = 1,
    Pending = 2,
    DueToday = 3,
    Overdue = 4,
}

/// One entry as handed to the OS search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: String,
    pub domain: String,
    pub title: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub relevance: RelevanceHint,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// OS search index API.
pub trait SearchBackend: Send + Sync {
    fn upsert(&self, items: Vec<SearchItem>) -> Result<(), IndexError>;
    fn delete(&self, ids: &[String]) -> Result<(), IndexError>;
    fn delete_domain(&self, domain: &str) -> Result<(), IndexError>;
}

fn status_words(status: DueStatus) -> &'static [&'static str] {
    match status {
        DueStatus::Completed => &["completed", "done"],
        DueStatus::Overdue => &["overdue", "pending"],
        DueStatus::DueToday => &["today", "due", "pending"],
        DueStatus::Upcoming => &["upcoming", "pending"],
        DueStatus::NoDueDate => &["pending"],
    }
}

fn relevance(status: DueStatus) -> RelevanceHint {
    match status {
        DueStatus::Completed => RelevanceHint::Completed,
        DueStatus::Overdue => RelevanceHint::Overdue,
        DueStatus::DueToday => RelevanceHint::DueToday,
        DueStatus::Upcoming => RelevanceHint::Pending,
        DueStatus::NoDueDate => RelevanceHint::Default,
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn summary(task: &Task, status: DueStatus, category: &Category) -> String {
    let label = match (status, task.due_date) {
        (DueStatus::Completed, _) => "Completed".to_string(),
        (DueStatus::Overdue, _) => "Overdue".to_string(),
        (DueStatus::DueToday, _) => "Due today".to_string(),
        (DueStatus::Upcoming, Some(due)) => {
            format!("Due {}", due.with_timezone(&Local).format("%b %-d"))
        }
        _ => "No due date".to_string(),
    };
    format!("{label} · {}", category.name)
}

#[derive(Clone)]
pub struct SearchIndexer {
    backend: Arc<dyn SearchBackend>,
    domain: String,
    completed_expiration: chrono::Duration,
}

impl SearchIndexer {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        domain: impl Into<String>,
        completed_expiration: chrono::Duration,
    ) -> Self {
        Self {
            backend,
            domain: domain.into(),
            completed_expiration,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Build the index entry for `task` as of `now`.
    pub fn item_for(&self, task: &Task, categories: &[Category], now: DateTime<Utc>) -> SearchItem {
        let category = task
            .category_id
            .as_deref()
            .and_then(|id| categories.iter().find(|category| category.id == id));
        self.project(task, category, now)
    }

    fn project(&self, task: &Task, category: Option<&Category>, now: DateTime<Utc>) -> SearchItem {
        let category = category.cloned().unwrap_or_else(uncategorized);
        let status = task.due_status(&now.with_timezone(&Local));

        let mut seen = HashSet::new();
        let mut keywords = Vec::new();
        let description = task.description.trim().to_lowercase();
        let candidates = tokens(&task.title)
            .chain((!description.is_empty()).then_some(description))
            .chain(status_words(status).iter().map(|word| word.to_string()))
            .chain(std::iter::once(category.name.to_lowercase()));
        for keyword in candidates {
            if seen.insert(keyword.clone()) {
                keywords.push(keyword);
            }
        }

        let expires_at = match (task.completed, task.completed_at) {
            (true, Some(completed_at)) => Some(completed_at + self.completed_expiration),
            _ => None,
        };

        SearchItem {
            id: task.id.clone(),
            domain: self.domain.clone(),
            title: task.title.clone(),
            summary: summary(task, status, &category),
            keywords,
            relevance: relevance(status),
            created_at: task.created_at,
            modified_at: now,
            expires_at,
        }
    }

    pub fn index_one(
        &self,
        task: &Task,
        categories: &[Category],
        now: DateTime<Utc>,
    ) -> Result<(), IndexError> {
        self.backend.upsert(vec![self.item_for(task, categories, now)])
    }

    /// Drop the whole domain, then index every task.
    pub fn index_all(
        &self,
        tasks: &[Task],
        categories: &[Category],
        now: DateTime<Utc>,
    ) -> Result<usize, IndexError> {
        self.backend.delete_domain(&self.domain)?;
        let by_id: HashMap<&str, &Category> = categories
            .iter()
            .map(|category| (category.id.as_str(), category))
            .collect();
        let items: Vec<SearchItem> = tasks
            .iter()
            .map(|task| {
                let category = task.category_id.as_deref().and_then(|id| by_id.get(id).copied());
                self.project(task, category, now)
            })
            .collect();
        let count = items.len();
        if count > 0 {
            self.backend.upsert(items)?;
        }
        Ok(count)
    }

    pub fn remove(&self, task_id: &str) -> Result<(), IndexError> {
        self.backend.delete(&[task_id.to_string()])
    }

    pub fn remove_all(&self) -> Result<(), IndexError> {
        self.backend.delete_domain(&self.domain)
    }

    fn execute(&self, command: IndexCommand) {
        let result = match command {
            IndexCommand::IndexOne {
                task,
                categories,
                now,
            } => self.index_one(&task, &categories, now),
            IndexCommand::IndexAll {
                tasks,
                categories,
                now,
            } => self.index_all(&tasks, &categories, now).map(|count| {
                tracing::debug!("reindexed {count} task(s) in {}", self.domain);
            }),
            IndexCommand::Remove(task_id) => self.remove(&task_id),
            IndexCommand::RemoveAll => self.remove_all(),
            IndexCommand::Flush(_) => Ok(()),
        };
        if let Err(err) = result {
            tracing::warn!("search indexing failed: {err}");
        }
    }
}

enum IndexCommand {
    IndexOne {
        task: Task,
        categories: Arc<[Category]>,
        now: DateTime<Utc>,
    },
    IndexAll {
        tasks: Vec<Task>,
        categories: Arc<[Category]>,
        now: DateTime<Utc>,
    },
    Remove(String),
    RemoveAll,
    Flush(oneshot::Sender<()>),
}

/// Queue in front of a [`SearchIndexer`] running on its own tokio task.
pub struct IndexerHandle {
    tx: mpsc::UnboundedSender<IndexCommand>,
    worker: JoinHandle<()>,
}

impl IndexerHandle {
    /// Start the worker. Must be called inside a tokio runtime.
    pub fn spawn(indexer: SearchIndexer) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<IndexCommand>();
        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                if let IndexCommand::Flush(done) = command {
                    let _ = done.send(());
                    continue;
                }
                let indexer = indexer.clone();
                if let Err(err) =
                    tokio::task::spawn_blocking(move || indexer.execute(command)).await
                {
                    tracing::warn!("search worker task failed: {err}");
                }
            }
        });
        Self { tx, worker }
    }

    pub fn index_one(&self, task: Task, categories: Arc<[Category]>, now: DateTime<Utc>) {
        self.send(IndexCommand::IndexOne {
            task,
            categories,
            now,
        });
    }

    pub fn index_all(&self, tasks: Vec<Task>, categories: Arc<[Category]>, now: DateTime<Utc>) {
        self.send(IndexCommand::IndexAll {
            tasks,
            categories,
            now,
        });
    }

    pub fn remove(&self, task_id: impl Into<String>) {
        self.send(IndexCommand::Remove(task_id.into()));
    }

    pub fn remove_all(&self) {
        self.send(IndexCommand::RemoveAll);
    }

    /// Wait until everything queued so far has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(IndexCommand::Flush(done_tx));
        let _ = done_rx.await;
    }

    fn send(&self, command: IndexCommand) {
        if self.tx.send(command).is_err() {
            tracing::warn!("search worker stopped; dropping index update");
        }
    }
}

impl Drop for IndexerHandle {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Rank `items` against a free-text query: every query token must prefix-match
/// a keyword or title token. Results are ordered by relevance, then title.
pub fn query<'a>(items: &'a [SearchItem], text: &str, now: DateTime<Utc>) -> Vec<&'a SearchItem> {
    let needles: Vec<String> = tokens(text).collect();
    let mut hits: Vec<&SearchItem> = items
        .iter()
        .filter(|item| item.expires_at.map(|expires| expires > now).unwrap_or(true))
        .filter(|item| {
            let haystack: Vec<String> = item
                .keywords
                .iter()
                .flat_map(|keyword| tokens(keyword).collect::<Vec<_>>())
                .chain(tokens(&item.title))
                .collect();
            needles
                .iter()
                .all(|needle| haystack.iter().any(|word| word.starts_with(needle.as_str())))
        })
        .collect();
    hits.sort_by(|a, b| {
        b.relevance
            .cmp(&a.relevance)
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
    hits
}

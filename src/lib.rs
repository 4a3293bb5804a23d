//! simplr - task fan-out core
//!
//! A task list whose every committed change is fanned out to three OS
//! collaborators: pending reminders, a search index, and the app badge.
//!
//! # Core Concepts
//!
//! - **Task store**: the ordered, profile-scoped list; the only source of truth
//! - **Reminders**: at most one pending reminder per task id
//! - **Search index**: a derived projection, rebuilt wholesale when labels change
//! - **Badge**: debounced count of tasks needing attention today
//! - **Profiles**: `personal` and `work`, each with its own storage namespace
//!
//! # Module Organization
//!
//! - `orchestrator`: composition root; applies mutations and fans them out
//! - `task`: task model, mutations, and the persisted store
//! - `category`: category collection and its TTL lookup cache
//! - `profile`: profiles, storage keys, active profile resolution
//! - `reminder`: reminder transitions and the scheduler
//! - `search`: index item projection and the ordered index worker
//! - `badge`: badge count and debounced writer
//! - `events`: broadcast event bus and JSONL sink
//! - `platform`: in-memory and file-backed OS collaborators
//! - `cli`: command-line interface using clap
//! - `config`: configuration loading from `simplr.toml`
//! - `storage` / `lock`: data directory layout, file locks, atomic writes

pub mod badge;
pub mod category;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod lock;
pub mod orchestrator;
pub mod output;
pub mod platform;
pub mod profile;
pub mod reminder;
pub mod search;
pub mod storage;
pub mod task;

pub use error::{Error, Result};
pub use orchestrator::{Backends, TaskOrchestrator};

//! Command-line interface for simplr
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{self, Event, EventDestination, EventSink};
use crate::orchestrator::{Backends, SystemClock, TaskOrchestrator};
use crate::output::OutputOptions;
use crate::profile;
use crate::storage::Storage;

mod category;
mod profile_cmd;
mod system;
mod task;

/// simplr - tasks with reminders, search, and a badge
///
/// Every change is saved first, then fanned out to the reminder list, the
/// search index, and the app badge kept under the data directory.
#[derive(Parser, Debug)]
#[command(name = "simplr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true, env = "SIMPLR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Profile to operate on for this invocation (personal, work)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit change events as JSONL to a file, or '-' for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Category management
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Active profile
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Purge expired completed tasks and rebuild the search index
    Maintain,

    /// App badge
    #[command(subcommand)]
    Badge(BadgeCommands),

    /// List pending reminders
    Reminders,

    /// Query the search index
    Search {
        /// Words to look for (prefix match)
        #[arg(required = true)]
        query: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    Add {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Due date: today, tomorrow, YYYY-MM-DD, or RFC 3339
        #[arg(long)]
        due: Option<String>,

        /// Reminder time: +30m, +2h, +1d, "YYYY-MM-DD HH:MM", or RFC 3339
        #[arg(long)]
        remind: Option<String>,

        /// Category id or name
        #[arg(short, long)]
        category: Option<String>,

        /// Checklist item (repeatable)
        #[arg(long = "check")]
        checklist: Vec<String>,

        /// Quick-list item (repeatable)
        #[arg(long = "quick")]
        quick_list: Vec<String>,
    },

    /// Edit a task
    Edit {
        /// Task id or unique id prefix
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long, conflicts_with = "no_due")]
        due: Option<String>,

        #[arg(long)]
        no_due: bool,

        #[arg(long, conflicts_with = "no_remind")]
        remind: Option<String>,

        #[arg(long)]
        no_remind: bool,

        #[arg(short, long, conflicts_with = "no_category")]
        category: Option<String>,

        #[arg(long)]
        no_category: bool,

        #[arg(long = "check")]
        checklist: Vec<String>,

        #[arg(long = "quick")]
        quick_list: Vec<String>,
    },

    /// Mark tasks completed
    Done {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Mark tasks not completed
    Undo {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete a task
    Rm { id: String },

    /// Move a task to a 1-based position
    Move { id: String, position: usize },

    /// Assign tasks to a category ("none" clears it)
    Assign {
        category: String,

        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List tasks
    List {
        /// all, active, today, completed (remembered per profile)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Toggle a checklist or quick-list item (1-based index or item id)
    Check {
        id: String,
        item: String,

        /// Toggle a quick-list item instead of a checklist item
        #[arg(long)]
        quick: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommands {
    /// List categories
    List,

    /// Add a custom category
    Add {
        name: String,

        #[arg(long, default_value = "gray")]
        color: String,
    },

    /// Rename or recolor a category
    Rename {
        /// Category id or name
        category: String,

        name: String,

        #[arg(long)]
        color: Option<String>,
    },

    /// Delete a custom category
    Rm { category: String },

    /// Restore well-known ids of built-in categories
    Repair,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Show the active profile
    Show,

    /// Switch the active profile
    Switch { profile: String },
}

#[derive(Subcommand, Debug)]
pub enum BadgeCommands {
    /// Show the badge value and the count it should have
    Show,

    /// Recompute the badge from stored tasks
    Refresh,
}

/// Global flags shared by every command.
#[derive(Debug, Clone)]
pub struct Globals {
    pub data_dir: Option<PathBuf>,
    pub profile: Option<String>,
    pub json: bool,
    pub quiet: bool,
    pub events: Option<String>,
}

impl Globals {
    pub fn output(&self) -> OutputOptions {
        OutputOptions {
            json: self.json && !self.events_to_stdout(),
            quiet: self.quiet,
        }
    }

    fn events_to_stdout(&self) -> bool {
        matches!(
            EventDestination::parse(self.events.as_deref()),
            Some(EventDestination::Stdout)
        )
    }
}

/// An opened data directory with its orchestrator, for one invocation.
pub(crate) struct Session {
    pub storage: Storage,
    pub orchestrator: TaskOrchestrator,
    pub output: OutputOptions,
    events: Option<(EventSink, broadcast::Receiver<Event>)>,
}

impl Session {
    pub fn open(globals: &Globals) -> Result<Self> {
        let storage = Storage::resolve(globals.data_dir.as_deref())?;
        storage.init()?;
        let config = Config::load_from_dir(storage.data_dir());
        let profile = profile::resolve_profile(&storage, &config, globals.profile.as_deref())?;

        let orchestrator = TaskOrchestrator::new(
            storage.clone(),
            config,
            profile,
            Backends::file(&storage),
            Arc::new(SystemClock),
        );

        let events = match EventDestination::parse(globals.events.as_deref()) {
            Some(destination) => Some((destination.open()?, orchestrator.subscribe())),
            None => None,
        };

        Ok(Self {
            storage,
            orchestrator,
            output: globals.output(),
            events,
        })
    }

    /// Let queued fan-out finish and flush events before the process exits.
    pub async fn finish(mut self) -> Result<()> {
        self.orchestrator.settle().await;
        if let Some((sink, rx)) = self.events.as_mut() {
            for event in events::drain(rx) {
                sink.emit(&event)?;
            }
        }
        Ok(())
    }
}

impl Cli {
    fn globals(&self) -> Globals {
        Globals {
            data_dir: self.data_dir.clone(),
            profile: self.profile.clone(),
            json: self.json,
            quiet: self.quiet,
            events: self.events.clone(),
        }
    }

    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.dispatch())
    }

    async fn dispatch(self) -> Result<()> {
        let globals = self.globals();
        match self.command {
            Commands::Task(cmd) => match cmd {
                TaskCommands::Add {
                    title,
                    description,
                    due,
                    remind,
                    category,
                    checklist,
                    quick_list,
                } => {
                    task::run_add(task::AddOptions {
                        title,
                        description,
                        due,
                        remind,
                        category,
                        checklist,
                        quick_list,
                        globals,
                    })
                    .await
                }
                TaskCommands::Edit {
                    id,
                    title,
                    description,
                    due,
                    no_due,
                    remind,
                    no_remind,
                    category,
                    no_category,
                    checklist,
                    quick_list,
                } => {
                    task::run_edit(task::EditOptions {
                        id,
                        title,
                        description,
                        due: Clearable::from_flags(due, no_due),
                        remind: Clearable::from_flags(remind, no_remind),
                        category: Clearable::from_flags(category, no_category),
                        checklist,
                        quick_list,
                        globals,
                    })
                    .await
                }
                TaskCommands::Done { ids } => task::run_set_completed(ids, true, globals).await,
                TaskCommands::Undo { ids } => task::run_set_completed(ids, false, globals).await,
                TaskCommands::Rm { id } => task::run_rm(id, globals).await,
                TaskCommands::Move { id, position } => task::run_move(id, position, globals).await,
                TaskCommands::Assign { category, ids } => {
                    task::run_assign(category, ids, globals).await
                }
                TaskCommands::List { filter } => task::run_list(filter, globals).await,
                TaskCommands::Check { id, item, quick } => {
                    task::run_check(id, item, quick, globals).await
                }
            },
            Commands::Category(cmd) => match cmd {
                CategoryCommands::List => category::run_list(globals).await,
                CategoryCommands::Add { name, color } => {
                    category::run_add(name, color, globals).await
                }
                CategoryCommands::Rename {
                    category,
                    name,
                    color,
                } => category::run_rename(category, name, color, globals).await,
                CategoryCommands::Rm { category } => category::run_rm(category, globals).await,
                CategoryCommands::Repair => category::run_repair(globals).await,
            },
            Commands::Profile(cmd) => match cmd {
                ProfileCommands::Show => profile_cmd::run_show(globals).await,
                ProfileCommands::Switch { profile } => {
                    profile_cmd::run_switch(profile, globals).await
                }
            },
            Commands::Maintain => system::run_maintain(globals).await,
            Commands::Badge(cmd) => match cmd {
                BadgeCommands::Show => system::run_badge_show(globals).await,
                BadgeCommands::Refresh => system::run_badge_refresh(globals).await,
            },
            Commands::Reminders => system::run_reminders(globals).await,
            Commands::Search { query } => system::run_search(query.join(" "), globals).await,
        }
    }
}

/// Optional CLI value that can also be cleared with a `--no-*` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clearable {
    Keep,
    Clear,
    Set(String),
}

impl Clearable {
    fn from_flags(value: Option<String>, clear: bool) -> Self {
        match (value, clear) {
            (_, true) => Clearable::Clear,
            (Some(value), false) => Clearable::Set(value),
            (None, false) => Clearable::Keep,
        }
    }
}

// =============================================================================
// Argument parsing helpers
// =============================================================================

fn local_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| Error::InvalidArgument(format!("{naive} does not exist in local time")))
}

fn at_local(date: NaiveDate, hour: u32) -> Result<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| Error::InvalidArgument(format!("invalid hour {hour}")))?;
    local_to_utc(date.and_time(time))
}

/// Due date: `today`, `tomorrow`, `YYYY-MM-DD` (local 09:00), or RFC 3339.
pub(crate) fn parse_due(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    let today = now.with_timezone(&Local).date_naive();
    match raw.to_lowercase().as_str() {
        "today" => return at_local(today, 9),
        "tomorrow" => return at_local(today + Duration::days(1), 9),
        "yesterday" => return at_local(today - Duration::days(1), 9),
        _ => {}
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return at_local(date, 9);
    }
    parse_instant(raw, now)
}

/// Reminder time: `+30m`, `+2h`, `+1d`, `YYYY-MM-DD HH:MM` (local), or RFC 3339.
pub(crate) fn parse_instant(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Some(offset) = raw.strip_prefix('+') {
        return parse_offset(offset).map(|offset| now + offset);
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return local_to_utc(naive);
    }
    Err(Error::InvalidArgument(format!(
        "invalid time '{raw}': use +30m, +2h, +1d, \"YYYY-MM-DD HH:MM\", or RFC 3339"
    )))
}

fn parse_offset(raw: &str) -> Result<Duration> {
    let invalid = || Error::InvalidArgument(format!("invalid offset '+{raw}'"));
    if raw.len() < 2 {
        return Err(invalid());
    }
    let (amount, unit) = raw.split_at(raw.len() - 1);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    match unit {
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        _ => Err(invalid()),
    }
}

/// Resolve a task reference: exact id, else a unique id prefix.
pub(crate) fn resolve_task_id(orchestrator: &TaskOrchestrator, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if orchestrator.task(raw).is_ok() {
        return Ok(raw.to_string());
    }
    let matches: Vec<&str> = orchestrator
        .tasks()
        .iter()
        .filter(|task| !raw.is_empty() && task.id.starts_with(raw))
        .map(|task| task.id.as_str())
        .collect();
    match matches.as_slice() {
        [only] => Ok(only.to_string()),
        [] => Err(Error::TaskNotFound(raw.to_string())),
        _ => Err(Error::InvalidArgument(format!(
            "task prefix '{raw}' is ambiguous ({} matches)",
            matches.len()
        ))),
    }
}

/// Resolve a category reference by id, then by case-insensitive name.
pub(crate) fn resolve_category_id(orchestrator: &TaskOrchestrator, raw: &str) -> Result<String> {
    let raw = raw.trim();
    let categories = orchestrator.categories();
    categories
        .iter()
        .find(|category| category.id == raw)
        .or_else(|| {
            categories
                .iter()
                .find(|category| category.name.eq_ignore_ascii_case(raw))
        })
        .map(|category| category.id.clone())
        .ok_or_else(|| Error::CategoryNotFound(raw.to_string()))
}

/// First eight characters of an id, for human output.
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

//! Error types for simplr
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown task or category)
//! - 4: Operation failed (persistence, io, lock contention)
//!
//! Fan-out failures (`ScheduleError`, `IndexError`, `BadgeWriteError`) never
//! abort a store mutation. They are reported as warnings or logged.

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the simplr CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Store encode/decode/write failure.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to decode {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock acquisition failed: {0}")]
    Locked(PathBuf),

    #[error("{key} could not be read; refusing to overwrite it until it loads")]
    Unreadable { key: String },
}

/// Reminder backend rejected a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("reminder for task {task_id} fires in the past ({fire_at})")]
    PastFireDate { task_id: String, fire_at: String },

    #[error("reminder for task {task_id} rejected: {reason}")]
    Rejected { task_id: String, reason: String },
}

impl ScheduleError {
    pub fn task_id(&self) -> &str {
        match self {
            ScheduleError::PastFireDate { task_id, .. } => task_id,
            ScheduleError::Rejected { task_id, .. } => task_id,
        }
    }
}

/// Search backend failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    #[error("search index rejected {count} item(s): {reason}")]
    Rejected { count: usize, reason: String },
}

/// Badge backend failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BadgeWriteError {
    #[error("badge update denied")]
    Denied,

    #[error("badge update failed: {0}")]
    Failed(String),
}

/// Main error type for simplr operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Built-in category cannot be deleted: {0}")]
    BuiltinCategory(String),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    // Operation failures (exit code 4)
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_)
            | Error::InvalidConfig(_)
            | Error::TaskNotFound(_)
            | Error::CategoryNotFound(_)
            | Error::BuiltinCategory(_)
            | Error::UnknownProfile(_) => exit_codes::USER_ERROR,

            Error::Persist(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error output, when the variant carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::TaskNotFound(id) => Some(serde_json::json!({ "task_id": id })),
            Error::CategoryNotFound(id) | Error::BuiltinCategory(id) => {
                Some(serde_json::json!({ "category_id": id }))
            }
            Error::LockFailed(path) => Some(serde_json::json!({ "path": path })),
            _ => None,
        }
    }
}

/// Result type alias for simplr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}

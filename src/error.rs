//! Error types crossing module seams.
//!
//! Domain and capability failures inside a turn are folded into
//! `WorkflowState` as data. Only infrastructure failures (checkpoint I/O,
//! configuration) surface as `Err` from the public API.

use thiserror::Error;

/// Service-level failure for a single turn
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Invalid thread id '{0}': use 1-128 characters from [A-Za-z0-9_.-]")]
    InvalidThreadId(String),

    #[error("Workflow exceeded {0} stage transitions in one turn")]
    StageLimitExceeded(usize),
}

/// Checkpoint persistence failure
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to access checkpoint {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize checkpoint for thread '{thread_id}': {source}")]
    Serde {
        thread_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "database")]
    #[error("Checkpoint database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Configuration loading failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Query execution or schema introspection failure
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Refusing to execute unsafe SQL: {0}")]
    Rejected(#[from] crate::sql::UnsafeSql),

    #[error("Only SELECT or WITH queries may be executed")]
    NotReadOnly,

    #[error("Table '{0}' not found or has no columns")]
    UnknownTable(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

//! Gantry error types.

use std::path::PathBuf;

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, GantryError>;

/// Every failure a Gantry component can surface.
#[derive(Debug, thiserror::Error)]
pub enum GantryError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCronExpression { expr: String, reason: String },

    #[error("Distributed job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("Lease '{name}' unavailable: {reason}")]
    Lease { name: String, reason: String },

    #[error("PID file {}: {reason}", path.display())]
    PidFile { path: PathBuf, reason: String },

    #[error("Process {pid} did not terminate after {waited_secs}s")]
    ProcessSurvived { pid: i32, waited_secs: u64 },

    #[error("Graceful shutdown exceeded {secs}s deadline")]
    ShutdownTimeout { secs: u64 },

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl GantryError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn lease(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Lease {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn pid_file(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::PidFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }
}

//! Custom error types for the backup runner.
//!
//! Every fatal condition maps to a distinct process exit code. Lock
//! contention is not an error (see [`crate::executor::RunOutcome::Skipped`]).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Required tool not found: {tool} ({path})")]
    MissingTool { tool: &'static str, path: String },

    #[error("Preflight failed: {0}")]
    Preflight(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock error on {path}: {reason}")]
    Lock { path: PathBuf, reason: String },

    #[error("Dump failed: {0}")]
    Dump(String),

    #[error("Compression failed: {0}")]
    Compress(String),
}

impl BackupError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupError::Config(_)
            | BackupError::MissingTool { .. }
            | BackupError::Preflight(_)
            | BackupError::Io(_)
            | BackupError::Lock { .. } => 1,
            BackupError::Dump(_) => 2,
            BackupError::Compress(_) => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let missing = BackupError::MissingTool {
            tool: "mysqldump",
            path: "mysqldump".to_string(),
        };
        assert_eq!(missing.exit_code(), 1);
        assert_eq!(BackupError::Config("bad".into()).exit_code(), 1);
        assert_eq!(BackupError::Dump("boom".into()).exit_code(), 2);
        assert_eq!(BackupError::Compress("boom".into()).exit_code(), 3);
    }

    #[test]
    fn test_missing_tool_message() {
        let err = BackupError::MissingTool {
            tool: "gzip",
            path: "/opt/bin/gzip".to_string(),
        };
        assert_eq!(err.to_string(), "Required tool not found: gzip (/opt/bin/gzip)");
    }
}

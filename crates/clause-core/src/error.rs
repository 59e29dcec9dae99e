//! Error types for the command layer
//!
//! All fallible operations return `Result<T, Error>`.
//! Errors are never caught and rewrapped on the way up: whatever a loader,
//! parser or engine returns is what the caller sees.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Command layer error types
#[derive(Debug, Error)]
pub enum Error {
    /// File missing, unreadable or unwritable
    #[error("IO error on {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON input or malformed model source
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Loaded template failed a local check (e.g. no logic units)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failure reported by the execution engine
    #[error("Engine error: {0}")]
    EngineError(String),
}

impl Error {
    /// Wrap an IO failure together with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::IoError {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Process exit code for this error: 1 for validation failures, 2 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ValidationError(_) => 1,
            _ => 2,
        }
    }
}

/// Result type alias for command layer operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = Error::io(
            "missing.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("missing.json"), "got: {}", msg);
        assert!(msg.contains("not found"), "got: {}", msg);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::ValidationError("x".into()).exit_code(), 1);
        assert_eq!(Error::ParseError("x".into()).exit_code(), 2);
        assert_eq!(Error::EngineError("x".into()).exit_code(), 2);
    }
}

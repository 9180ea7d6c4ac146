//! Engine error taxonomy.
//!
//! Only conditions that must reach the caller live here. Expected read
//! failures (a file vanished mid-scan, permission denied while hashing)
//! never become an `EngineError`: they degrade to missing audit fields or
//! a WARNING alert instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine state lock could not be taken within the bounded wait.
    #[error("timed out after {waited:?} waiting for the {what} lock")]
    LockTimeout { what: &'static str, waited: Duration },

    /// Writing a persisted document failed. A lost audit entry or baseline
    /// is a security-relevant data loss, so this always propagates.
    #[error("failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Baseline was interrupted via its cancellation flag. Records hashed
    /// before the interruption are persisted.
    #[error("baseline cancelled after {baselined} file(s)")]
    Cancelled { baselined: usize },

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

impl EngineError {
    pub(crate) fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }
}

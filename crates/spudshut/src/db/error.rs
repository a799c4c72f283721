//! Errors raised by the job store.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobStatus;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the store's parent directory failed.
    #[error("Cannot prepare store location '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// Another thread panicked while holding the connection.
    #[error("Job store lock poisoned")]
    LockPoisoned,

    /// An active job already exists for this input.
    #[error("Job {existing_id} is already active for '{input_path}'")]
    Duplicate { input_path: PathBuf, existing_id: i64 },

    #[error("Job {0} not found")]
    NotFound(i64),

    /// The requested status change is not an edge of the state machine.
    #[error("Job {id}: illegal status transition {from} -> {to}")]
    IllegalTransition {
        id: i64,
        from: JobStatus,
        to: JobStatus,
    },

    /// A stored value could not be decoded.
    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}

impl DatabaseError {
    /// Race-guard and bookkeeping errors that concern a single job only.
    pub fn is_job_scoped(&self) -> bool {
        matches!(
            self,
            Self::Duplicate { .. } | Self::NotFound(_) | Self::IllegalTransition { .. }
        )
    }
}

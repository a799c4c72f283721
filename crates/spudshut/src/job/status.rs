//! Job status state machine.
//!
//! ```text
//! NEW -> CHUNKING -> CHUNKED -> CONVERTING -> CONVERTED -> JOINING -> COMPLETED
//!           |                       |                        |
//!           +-----------------------+------------------------+--> ERROR
//! ```
//!
//! Every in-progress status can also be requeued to the completed status
//! before it, and `ERROR` can only be left through an explicit retry.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    New,
    Chunking,
    Chunked,
    Converting,
    Converted,
    Joining,
    Completed,
    Error,
}

/// A unit of external work bound to a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Chunk,
    Convert,
    Join,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Convert => "convert",
            Self::Join => "join",
        }
    }

    /// The status a job must be in for this stage to be dispatched.
    pub fn ready_status(&self) -> JobStatus {
        match self {
            Self::Chunk => JobStatus::New,
            Self::Convert => JobStatus::Chunked,
            Self::Join => JobStatus::Converted,
        }
    }

    /// The claimed status while this stage runs.
    pub fn running_status(&self) -> JobStatus {
        match self {
            Self::Chunk => JobStatus::Chunking,
            Self::Convert => JobStatus::Converting,
            Self::Join => JobStatus::Joining,
        }
    }

    /// The status reached when this stage succeeds.
    pub fn done_status(&self) -> JobStatus {
        match self {
            Self::Chunk => JobStatus::Chunked,
            Self::Convert => JobStatus::Converted,
            Self::Join => JobStatus::Completed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::New,
        JobStatus::Chunking,
        JobStatus::Chunked,
        JobStatus::Converting,
        JobStatus::Converted,
        JobStatus::Joining,
        JobStatus::Completed,
        JobStatus::Error,
    ];

    /// Statuses the orchestrator dispatches from, furthest-advanced first.
    pub const ACTIONABLE: [JobStatus; 3] =
        [JobStatus::Converted, JobStatus::Chunked, JobStatus::New];

    pub const IN_PROGRESS: [JobStatus; 3] =
        [JobStatus::Chunking, JobStatus::Converting, JobStatus::Joining];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Chunking => "CHUNKING",
            Self::Chunked => "CHUNKED",
            Self::Converting => "CONVERTING",
            Self::Converted => "CONVERTED",
            Self::Joining => "JOINING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        }
    }

    /// COMPLETED and ERROR are never advanced automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Chunking | Self::Converting | Self::Joining)
    }

    /// The stage this status is waiting for or running.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::New | Self::Chunking => Some(Stage::Chunk),
            Self::Chunked | Self::Converting => Some(Stage::Convert),
            Self::Converted | Self::Joining => Some(Stage::Join),
            Self::Completed | Self::Error => None,
        }
    }

    /// NEW -> CHUNKING, CHUNKED -> CONVERTING, CONVERTED -> JOINING.
    pub fn dispatch_target(&self) -> Option<JobStatus> {
        match self {
            Self::New | Self::Chunked | Self::Converted => {
                self.stage().map(|s| s.running_status())
            }
            _ => None,
        }
    }

    /// CHUNKING -> CHUNKED, CONVERTING -> CONVERTED, JOINING -> COMPLETED.
    pub fn completion_target(&self) -> Option<JobStatus> {
        if self.is_in_progress() {
            self.stage().map(|s| s.done_status())
        } else {
            None
        }
    }

    /// The last completed status before an in-progress one.
    pub fn requeue_target(&self) -> Option<JobStatus> {
        if self.is_in_progress() {
            self.stage().map(|s| s.ready_status())
        } else {
            None
        }
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// Retry edges out of `ERROR` are not included: they go through
    /// `job_repo::retry`, which picks the re-entry point from the job's paths.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if next == JobStatus::Error {
            return !self.is_terminal();
        }
        self.dispatch_target() == Some(next)
            || self.completion_target() == Some(next)
            || self.requeue_target() == Some(next)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: UnknownStatus| FromSqlError::Other(Box::new(e)))
    }
}

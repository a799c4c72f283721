use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::status::JobStatus;

/// One source audio file's tracked progress through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub original_filename: String,
    pub input_path: PathBuf,
    pub status: JobStatus,
    pub chunks_dir: Option<PathBuf>,
    pub converted_chunks_dir: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// File stem of the input, used to name chunks and the joined output.
    pub fn stem(&self) -> String {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("job{}", self.id))
    }

    /// Per-job directory name under the work directory.
    ///
    /// Prefixed with the id so two jobs over files with the same stem never
    /// share chunk directories.
    pub fn work_key(&self) -> String {
        format!("{:06}_{}", self.id, self.stem())
    }

    /// Status an `ERROR` job re-enters at, derived from the paths that
    /// earlier stages already produced.
    pub fn retry_entry(&self) -> JobStatus {
        if self.converted_chunks_dir.is_some() {
            JobStatus::Converted
        } else if self.chunks_dir.is_some() {
            JobStatus::Chunked
        } else {
            JobStatus::New
        }
    }
}

/// Paths produced by a successful stage. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagePaths {
    pub chunks_dir: Option<PathBuf>,
    pub converted_chunks_dir: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
}

impl StagePaths {
    pub fn chunks(dir: impl AsRef<Path>) -> Self {
        Self {
            chunks_dir: Some(dir.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    pub fn converted(dir: impl AsRef<Path>) -> Self {
        Self {
            converted_chunks_dir: Some(dir.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    pub fn output(path: impl AsRef<Path>) -> Self {
        Self {
            output_path: Some(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks_dir.is_none() && self.converted_chunks_dir.is_none() && self.output_path.is_none()
    }
}

/// A recorded status change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub id: i64,
    pub job_id: i64,
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(chunks: Option<&str>, converted: Option<&str>) -> Job {
        Job {
            id: 7,
            original_filename: "talk.m4a".to_string(),
            input_path: PathBuf::from("/in/talk.m4a"),
            status: JobStatus::Error,
            chunks_dir: chunks.map(PathBuf::from),
            converted_chunks_dir: converted.map(PathBuf::from),
            output_path: None,
            error_message: Some("boom".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_retry_entry_follows_populated_paths() {
        assert_eq!(job(None, None).retry_entry(), JobStatus::New);
        assert_eq!(job(Some("/w/c"), None).retry_entry(), JobStatus::Chunked);
        assert_eq!(
            job(Some("/w/c"), Some("/w/v")).retry_entry(),
            JobStatus::Converted
        );
    }

    #[test]
    fn test_stem_and_work_key() {
        let job = job(None, None);
        assert_eq!(job.stem(), "talk");
        assert_eq!(job.work_key(), "000007_talk");
    }

    #[test]
    fn test_stage_paths_constructors() {
        assert!(StagePaths::default().is_empty());
        let paths = StagePaths::chunks("/w/chunks");
        assert_eq!(paths.chunks_dir, Some(PathBuf::from("/w/chunks")));
        assert!(paths.converted_chunks_dir.is_none());
        assert!(!StagePaths::output("/out/a.wav").is_empty());
    }
}

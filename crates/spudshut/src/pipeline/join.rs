use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::job::{Job, StagePaths};
use crate::voice::ext_from_output_format;

use super::error::StageError;
use super::naming;
use super::runner::Pipeline;

impl Pipeline {
    /// Concatenates converted chunks (or raw chunks when conversion was
    /// skipped) into the output directory.
    ///
    /// Only files in the format this run produces are joined, so leftovers
    /// from an attempt with another output format never end up in the result.
    pub(super) async fn join(&self, job: &Job) -> Result<StagePaths, StageError> {
        let (source_dir, converted) = match (&job.converted_chunks_dir, &job.chunks_dir) {
            (Some(dir), _) => (dir, true),
            (None, Some(dir)) => (dir, false),
            (None, None) => return Err(StageError::MissingPath("chunks directory")),
        };

        let all = sequenced(source_dir)?;
        let Some(first) = all.first() else {
            return Err(StageError::EmptyDirectory(source_dir.clone()));
        };
        let ext = if converted {
            self.config
                .conversion
                .as_ref()
                .map(|s| ext_from_output_format(&s.output_format).to_string())
                .or_else(|| extension_of(first))
        } else {
            self.raw_chunk_extension(job)
        };

        let total = all.len();
        let files = naming::with_extension(all, ext.as_deref());
        if files.is_empty() {
            return Err(StageError::EmptyDirectory(source_dir.clone()));
        }
        if files.len() < total {
            debug!(
                ignored = total - files.len(),
                "Ignoring files in another format"
            );
        }
        if let Some(seq) = naming::duplicate_sequence(&files) {
            return Err(StageError::DuplicateSequence {
                dir: source_dir.clone(),
                seq,
            });
        }

        if converted {
            // Raw chunks may have been cleaned up after conversion.
            if let Some(chunks_dir) = job.chunks_dir.as_ref().filter(|d| d.is_dir()) {
                let chunks = naming::with_extension(
                    sequenced(chunks_dir)?,
                    self.raw_chunk_extension(job).as_deref(),
                );
                if chunks.len() != files.len() {
                    return Err(StageError::ChunkCountMismatch {
                        dir: source_dir.clone(),
                        expected: chunks.len(),
                        found: files.len(),
                    });
                }
            }
        }

        let out_dir = &self.config.output_directory;
        std::fs::create_dir_all(out_dir).map_err(|e| StageError::io(out_dir, e))?;
        let output = naming::joined_output_path(out_dir, &job.stem(), converted, ext.as_deref());

        self.bounded("joining", self.engine.concat(&files, &output))
            .await??;

        info!(parts = files.len(), converted, "Join complete");
        Ok(StagePaths::output(output))
    }

    fn raw_chunk_extension(&self, job: &Job) -> Option<String> {
        naming::chunk_extension(self.config.codec, &job.input_path)
    }
}

fn sequenced(dir: &Path) -> Result<Vec<PathBuf>, StageError> {
    if !dir.is_dir() {
        return Err(StageError::EmptyDirectory(dir.to_path_buf()));
    }
    naming::sequenced_files(dir).map_err(|e| StageError::io(dir, e))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().into_owned())
}

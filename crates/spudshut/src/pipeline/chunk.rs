use tracing::{debug, info};

use crate::engine::SegmentRequest;
use crate::job::{Job, StagePaths};

use super::error::StageError;
use super::naming;
use super::runner::Pipeline;

impl Pipeline {
    /// Splits the job's input into `<work>/<key>/chunks/<stem>_NNN.<ext>`.
    pub(super) async fn chunk(&self, job: &Job) -> Result<StagePaths, StageError> {
        if !job.input_path.is_file() {
            return Err(StageError::InputMissing(job.input_path.clone()));
        }

        let dir = self
            .config
            .work_directory
            .join(job.work_key())
            .join("chunks");
        std::fs::create_dir_all(&dir).map_err(|e| StageError::io(&dir, e))?;

        let removed = naming::clear_chunk_files(&dir).map_err(|e| StageError::io(&dir, e))?;
        if removed > 0 {
            debug!(removed, "Cleared chunk files from an earlier attempt");
        }

        let ext = naming::chunk_extension(self.config.codec, &job.input_path);
        let request = SegmentRequest {
            input: job.input_path.clone(),
            output_template: naming::chunk_template(&dir, &job.stem(), ext.as_deref()),
            chunk_seconds: self.config.chunk_seconds,
            codec: self.config.codec,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            bitrate: self.config.bitrate.clone(),
            verbose: self.config.verbose,
        };

        self.bounded("segmenting", self.engine.segment(&request))
            .await??;

        let chunks = naming::sequenced_files(&dir).map_err(|e| StageError::io(&dir, e))?;
        if chunks.is_empty() {
            return Err(StageError::NoChunks(dir));
        }

        info!(chunks = chunks.len(), codec = %self.config.codec, "Chunking complete");
        Ok(StagePaths::chunks(dir))
    }
}

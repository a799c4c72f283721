use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::job::{Job, StagePaths};
use crate::sanitize;
use crate::voice::{ext_from_output_format, VoiceError};

use super::error::StageError;
use super::naming;
use super::runner::Pipeline;

impl Pipeline {
    /// Voice-converts every chunk into `<work>/<key>/converted`.
    ///
    /// Chunks whose converted file already exists are skipped unless
    /// `overwrite` is set, so a retry only pays for what is missing. The
    /// first failing chunk fails the stage.
    pub(super) async fn convert(
        &self,
        job: &Job,
        shutdown: &AtomicBool,
    ) -> Result<StagePaths, StageError> {
        let Some(settings) = &self.config.conversion else {
            info!("Conversion disabled, passing chunks through");
            return Ok(StagePaths::default());
        };
        let converter = self.converter.as_ref().ok_or_else(|| StageError::Voice {
            chunk: job.original_filename.clone(),
            source: VoiceError::MissingCredential("no voice converter available".to_string()),
        })?;

        let chunks_dir = job
            .chunks_dir
            .as_ref()
            .ok_or(StageError::MissingPath("chunks directory"))?;
        if !chunks_dir.is_dir() {
            return Err(StageError::EmptyDirectory(chunks_dir.clone()));
        }
        let chunks = naming::sequenced_files(chunks_dir).map_err(|e| StageError::io(chunks_dir, e))?;
        if chunks.is_empty() {
            return Err(StageError::EmptyDirectory(chunks_dir.clone()));
        }

        let out_dir = self
            .config
            .work_directory
            .join(job.work_key())
            .join("converted");
        std::fs::create_dir_all(&out_dir).map_err(|e| StageError::io(&out_dir, e))?;

        let ext = ext_from_output_format(&settings.output_format);
        let mut converted = 0usize;
        let mut skipped = 0usize;

        for chunk in &chunks {
            let target = naming::converted_chunk_path(&out_dir, chunk, ext);
            if target.exists() && !settings.overwrite {
                skipped += 1;
                continue;
            }
            if shutdown.load(Ordering::SeqCst) {
                return Err(StageError::Interrupted);
            }

            let chunk_name = sanitize::redact_path(chunk);
            debug!(chunk = %chunk_name, "Converting chunk");
            let audio = self
                .bounded(
                    format!("converting {}", chunk_name),
                    converter.convert(
                        chunk,
                        &settings.voice_id,
                        &settings.model,
                        &settings.output_format,
                    ),
                )
                .await?
                .map_err(|e| StageError::Voice {
                    chunk: chunk_name.clone(),
                    source: e,
                })?;

            let part = naming::part_path(&target);
            tokio::fs::write(&part, &audio)
                .await
                .map_err(|e| StageError::io(&part, e))?;
            tokio::fs::rename(&part, &target)
                .await
                .map_err(|e| StageError::io(&target, e))?;
            converted += 1;
        }

        info!(
            converted,
            skipped,
            total = chunks.len(),
            "Conversion complete"
        );
        Ok(StagePaths::converted(out_dir))
    }
}

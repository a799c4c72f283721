use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, info_span, warn, Instrument};

use crate::engine::MediaEngine;
use crate::job::{Job, Stage, StagePaths};
use crate::sanitize;
use crate::voice::VoiceConverter;

use super::config::PipelineConfig;
use super::error::StageError;

/// Result of one stage run. The orchestrator maps each variant to a store
/// update.
#[derive(Debug)]
pub enum StageOutcome {
    Success(StagePaths),
    /// Job-scoped failure; the job goes to `ERROR`.
    Failed(StageError),
    /// Nothing can proceed; the job is requeued and the run stops.
    Fatal(StageError),
    /// Shutdown was requested before the stage finished.
    Interrupted,
}

impl StageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failed(_) => "failed",
            Self::Fatal(_) => "fatal",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Stage executors. They read the job record and the filesystem but never
/// touch the job store.
pub struct Pipeline {
    pub(super) config: Arc<PipelineConfig>,
    pub(super) engine: Arc<dyn MediaEngine>,
    pub(super) converter: Option<Arc<dyn VoiceConverter>>,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        engine: Arc<dyn MediaEngine>,
        converter: Option<Arc<dyn VoiceConverter>>,
    ) -> Self {
        Self {
            config,
            engine,
            converter,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one stage for `job`.
    pub async fn run_stage(&self, job: &Job, stage: Stage, shutdown: &AtomicBool) -> StageOutcome {
        let filename = sanitize::redact_path(&job.input_path);
        let span = info_span!("stage",
            job_id = job.id,
            stage = %stage,
            filename = %filename,
        );

        async {
            if shutdown.load(Ordering::SeqCst) {
                return StageOutcome::Interrupted;
            }

            let started = Instant::now();
            let result = match stage {
                Stage::Chunk => self.chunk(job).await,
                Stage::Convert => self.convert(job, shutdown).await,
                Stage::Join => self.join(job).await,
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(paths) => {
                    info!(elapsed_ms, "Stage finished");
                    StageOutcome::Success(paths)
                }
                Err(StageError::Interrupted) => {
                    warn!(elapsed_ms, "Stage interrupted by shutdown");
                    StageOutcome::Interrupted
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Stage hit a fatal error");
                    StageOutcome::Fatal(e)
                }
                Err(e) => {
                    warn!(error = %e, elapsed_ms, "Stage failed");
                    StageOutcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Bounds one external call by the stage timeout.
    pub(super) async fn bounded<T>(
        &self,
        what: impl Into<String>,
        fut: impl Future<Output = T>,
    ) -> Result<T, StageError> {
        let limit = self.config.stage_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StageError::Timeout {
                what: what.into(),
                secs: limit.as_secs(),
            })
    }
}

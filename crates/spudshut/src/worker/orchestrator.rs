//! The orchestrator loop: the only writer of job state while running.
//!
//! Each iteration requeues stale in-progress jobs, ingests new files,
//! claims actionable jobs (furthest stage first) into the worker pool and
//! applies exactly one report per dispatched job before polling again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::{Config, OrchestratorConfig};
use crate::db::{job_repo, Database, DatabaseError};
use crate::engine::{EngineError, MediaEngine};
use crate::error::WorkerError;
use crate::job::{JobStatus, Stage};
use crate::pipeline::{StageError, StageOutcome};
use crate::voice::{find_voice_id, VoiceConverter, VoiceError};

use super::pool::{StageReport, WorkerPool};
use super::scanner::DirectoryScanner;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Fatal error in {stage} stage of job {job_id}: {source}")]
    Fatal {
        job_id: i64,
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("Media tool unavailable: {0}")]
    Engine(#[from] EngineError),

    #[error("Voice service unavailable: {0}")]
    Voice(#[from] VoiceError),

    #[error("Conversion is enabled but no voice is configured")]
    NoVoice,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Counters for one pass of [`Orchestrator::run_iteration`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationSummary {
    pub ingested: usize,
    pub requeued: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Checks external collaborators before any job is claimed.
///
/// Verifies that the media tool starts and, when conversion is enabled,
/// that the credential is accepted and the configured voice exists.
/// Returns the resolved voice ID.
pub async fn preflight(
    config: &Config,
    engine: &dyn MediaEngine,
    converter: Option<&dyn VoiceConverter>,
) -> Result<Option<String>, OrchestratorError> {
    engine.probe().await?;
    debug!("Media tool '{}' is available", config.ffmpeg_path);

    if !config.conversion.enabled {
        return Ok(None);
    }
    let ident = config
        .conversion
        .voice
        .as_deref()
        .ok_or(OrchestratorError::NoVoice)?;
    let converter = converter.ok_or_else(|| {
        VoiceError::MissingCredential("voice converter not configured".to_string())
    })?;

    // Listing also proves the key is valid before any job is touched.
    let voices = converter.list_voices().await?;
    let voice_id = find_voice_id(&voices, ident)?;
    info!("Using voice {} for conversion", voice_id);
    Ok(Some(voice_id))
}

/// Requeues in-progress jobs not updated within `stale_after`. Returns the
/// ids that were moved.
pub fn reconcile_stale(db: &Database, stale_after: Duration) -> Result<Vec<i64>, DatabaseError> {
    let window = chrono::Duration::from_std(stale_after)
        .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
    let cutoff = Utc::now()
        .checked_sub_signed(window)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let mut requeued = Vec::new();
    for job in job_repo::find_stale(db, cutoff)? {
        let reason = format!("stale since {}", job.updated_at.to_rfc3339());
        match job_repo::requeue(db, job.id, &reason) {
            Ok(status) => {
                warn!(
                    "Job {} stuck in {} since {}, requeued to {}",
                    job.id, job.status, job.updated_at, status
                );
                requeued.push(job.id);
            }
            Err(e) if e.is_job_scoped() => {
                debug!("Job {} moved before it could be requeued: {}", job.id, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(requeued)
}

pub struct Orchestrator {
    db: Database,
    scanner: DirectoryScanner,
    pool: WorkerPool,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
    stale_after: Duration,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        scanner: DirectoryScanner,
        pool: WorkerPool,
        settings: &OrchestratorConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            db,
            scanner,
            pool,
            shutdown,
            poll_interval: settings.poll_interval(),
            stale_after: settings.stale_after(),
        }
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// One reconcile / ingest / dispatch / collect pass.
    pub fn run_iteration(&self) -> Result<IterationSummary, OrchestratorError> {
        let mut summary = IterationSummary {
            requeued: reconcile_stale(&self.db, self.stale_after)?.len(),
            ingested: self.ingest()?,
            ..Default::default()
        };

        summary.dispatched = self.dispatch()?;

        let mut fatal = None;
        for _ in 0..summary.dispatched {
            let report = self.pool.recv_report()?;
            if let Some(e) = self.apply(report, &mut summary) {
                if fatal.is_none() {
                    fatal = Some(e);
                }
            }
        }

        if summary.dispatched > 0 {
            info!(
                "Iteration: {} dispatched, {} succeeded, {} failed, {} requeued, {} ingested",
                summary.dispatched,
                summary.succeeded,
                summary.failed,
                summary.requeued,
                summary.ingested
            );
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Registers new input files. An unreadable input directory only skips
    /// ingest for this pass; jobs already tracked keep moving.
    fn ingest(&self) -> Result<usize, OrchestratorError> {
        match self.scanner.ingest(&self.db) {
            Ok(created) => Ok(created.len()),
            Err(e @ (WorkerError::Input { .. } | WorkerError::ScanFailed { .. })) => {
                warn!("Skipping ingest: {}", e);
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Claims and submits one stage for every actionable job.
    fn dispatch(&self) -> Result<usize, OrchestratorError> {
        let mut dispatched = 0;

        for status in JobStatus::ACTIONABLE {
            let (Some(stage), Some(target)) = (status.stage(), status.dispatch_target()) else {
                continue;
            };

            for mut job in job_repo::list_jobs(&self.db, status)? {
                if self.stopping() {
                    return Ok(dispatched);
                }

                match job_repo::claim(&self.db, job.id, status, target) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("Job {} was claimed elsewhere, skipping", job.id);
                        continue;
                    }
                    Err(e) if e.is_job_scoped() => {
                        warn!("Could not claim job {}: {}", job.id, e);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }

                let job_id = job.id;
                job.status = target;
                if let Err(e) = self.pool.submit(job, stage) {
                    if let Err(requeue_err) = job_repo::requeue(&self.db, job_id, "worker pool closed")
                    {
                        error!("Failed to requeue job {}: {}", job_id, requeue_err);
                    }
                    return Err(e.into());
                }
                debug!("Dispatched {} for job {}", stage, job_id);
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }

    /// Persists one report. Store errors are logged and only affect this job.
    fn apply(
        &self,
        report: StageReport,
        summary: &mut IterationSummary,
    ) -> Option<OrchestratorError> {
        let StageReport {
            job_id,
            stage,
            status,
            outcome,
        } = report;
        debug!("Job {} {} stage: {}", job_id, stage, outcome.label());

        let mut fatal = None;
        let result = match outcome {
            StageOutcome::Success(paths) => match status.completion_target() {
                Some(done) => {
                    summary.succeeded += 1;
                    job_repo::advance(&self.db, job_id, status, done, &paths)
                }
                None => Err(DatabaseError::IllegalTransition {
                    id: job_id,
                    from: status,
                    to: stage.done_status(),
                }),
            },
            StageOutcome::Failed(e) => {
                summary.failed += 1;
                job_repo::set_error(&self.db, job_id, &e.to_string())
            }
            StageOutcome::Interrupted => {
                summary.requeued += 1;
                job_repo::requeue(&self.db, job_id, "interrupted by shutdown").map(|_| ())
            }
            StageOutcome::Fatal(e) => {
                summary.requeued += 1;
                let requeued = job_repo::requeue(&self.db, job_id, &format!("fatal: {}", e));
                fatal = Some(OrchestratorError::Fatal {
                    job_id,
                    stage,
                    source: e,
                });
                requeued.map(|_| ())
            }
        };

        if let Err(e) = result {
            error!("Failed to record {} outcome for job {}: {}", stage, job_id, e);
        }
        fatal
    }

    /// Sleeps up to `duration`, waking early on shutdown.
    fn idle(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    /// Loops until shutdown. With `once`, returns as soon as an iteration
    /// finds nothing to dispatch.
    pub fn run(&self, once: bool) -> Result<(), OrchestratorError> {
        info!(
            "Orchestrator started ({} workers, polling every {:?})",
            self.pool.worker_count(),
            self.poll_interval
        );

        while !self.stopping() {
            let summary = self.run_iteration()?;
            if summary.dispatched == 0 {
                if once {
                    info!("No actionable jobs left");
                    break;
                }
                self.idle(self.poll_interval);
            }
        }

        if self.stopping() {
            info!("Orchestrator stopping on shutdown request");
        }
        Ok(())
    }

    /// Stops the worker pool and waits for it.
    pub fn finish(self) {
        self.pool.wait();
    }
}

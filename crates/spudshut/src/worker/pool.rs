use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::job::{Job, JobStatus, Stage};
use crate::pipeline::{Pipeline, StageError, StageOutcome};

/// One stage to run for a job that has already been claimed.
#[derive(Debug)]
pub struct Dispatch {
    pub job: Job,
    pub stage: Stage,
}

/// What a worker sends back for every dispatch it receives.
#[derive(Debug)]
pub struct StageReport {
    pub job_id: i64,
    pub stage: Stage,
    /// The in-progress status the job was claimed into.
    pub status: JobStatus,
    pub outcome: StageOutcome,
}

/// Fixed set of worker threads, each driving stages on its own
/// current-thread tokio runtime.
///
/// Every submitted dispatch produces exactly one [`StageReport`]. Once the
/// shutdown flag is set, stages still in the queue report
/// [`StageOutcome::Interrupted`] without doing any work.
pub struct WorkerPool {
    dispatch_sender: Sender<Dispatch>,
    report_receiver: Receiver<StageReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        pipeline: Arc<Pipeline>,
        worker_count: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (dispatch_sender, dispatch_receiver) = bounded::<Dispatch>(worker_count);
        // Reports are never dropped and never block a worker, so the
        // orchestrator may submit a whole batch before collecting.
        let (report_sender, report_receiver) = unbounded::<StageReport>();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| WorkerError::SpawnFailed(format!("tokio runtime: {}", e)))?;
            let rx = dispatch_receiver.clone();
            let tx = report_sender.clone();
            let flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);

            let handle = thread::Builder::new()
                .name(format!("spudshut-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, runtime, rx, tx, flag, worker_pipeline))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            dispatch_sender,
            report_receiver,
            workers,
            shutdown,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues a stage. Blocks while every worker is busy and the queue is
    /// full.
    pub fn submit(&self, job: Job, stage: Stage) -> Result<(), WorkerError> {
        self.dispatch_sender
            .send(Dispatch { job, stage })
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Waits for the next report.
    pub fn recv_report(&self) -> Result<StageReport, WorkerError> {
        self.report_receiver
            .recv()
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Closes the queue and joins all workers.
    pub fn wait(self) {
        drop(self.dispatch_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    runtime: tokio::runtime::Runtime,
    dispatch_receiver: Receiver<Dispatch>,
    report_sender: Sender<StageReport>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
) {
    debug!("Worker {} started", worker_id);

    // Runs until the pool drops its sender, so nothing queued goes unanswered.
    while let Ok(Dispatch { job, stage }) = dispatch_receiver.recv() {
        debug!(
            "Worker {} running {} for job {}",
            worker_id, stage, job.id
        );

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            runtime.block_on(pipeline.run_stage(&job, stage, &shutdown))
        }))
        .unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Worker {} panicked on job {}: {}", worker_id, job.id, message);
            StageOutcome::Failed(StageError::Panicked(message))
        });

        let report = StageReport {
            job_id: job.id,
            stage,
            status: job.status,
            outcome,
        };
        if report_sender.send(report).is_err() {
            error!("Worker {} lost the report channel", worker_id);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}

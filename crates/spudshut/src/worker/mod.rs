pub mod orchestrator;
pub mod pool;
pub mod scanner;

pub use orchestrator::{
    preflight, reconcile_stale, IterationSummary, Orchestrator, OrchestratorError,
};
pub use pool::{Dispatch, StageReport, WorkerPool};
pub use scanner::{ingest_file, DirectoryScanner};

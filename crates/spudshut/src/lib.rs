pub mod codec;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod voice;
pub mod worker;

pub use codec::Codec;
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use engine::{FfmpegEngine, MediaEngine};
pub use error::{ConfigError, Result, SpudshutError, WorkerError};
pub use job::{Job, JobEvent, JobStatus, Stage, StagePaths};
pub use pipeline::{Pipeline, PipelineConfig, StageOutcome};
pub use secrets::{resolve_api_key, resolve_secret, SecretError};
pub use voice::{ElevenLabsClient, VoiceConverter};
pub use worker::{Orchestrator, OrchestratorError, WorkerPool};

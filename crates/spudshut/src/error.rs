use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpudshutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] crate::worker::OrchestratorError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Voice service error: {0}")]
    Voice(#[from] crate::voice::VoiceError),

    #[error("Media engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Unsupported codec: {0}")]
    UnknownCodec(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Cannot use input '{path}': {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, SpudshutError>;

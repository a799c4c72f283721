//! External media tool seam.
//!
//! The pipeline talks to ffmpeg only through [`MediaEngine`], so tests can
//! swap in a fake that writes files without spawning processes.

mod command;
mod ffmpeg;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::Codec;

pub use command::{concat_args, concat_list, segment_args};
pub use ffmpeg::FfmpegEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The tool binary could not be started at all.
    #[error("'{program}' not found or not executable: {source}")]
    ToolNotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {code}: {stderr}")]
    Failed {
        program: String,
        code: String,
        stderr: String,
    },

    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// A missing tool stops the whole run, not just one job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. })
    }
}

/// Parameters for splitting one input into fixed-length segments.
#[derive(Debug, Clone)]
pub struct SegmentRequest {
    pub input: PathBuf,
    /// Output pattern with a `%03d` placeholder, e.g. `/w/chunks/talk_%03d.flac`.
    pub output_template: PathBuf,
    pub chunk_seconds: u32,
    pub codec: Codec,
    pub sample_rate: u32,
    pub channels: u8,
    pub bitrate: Option<String>,
    pub verbose: bool,
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Splits `req.input` into segments written to `req.output_template`.
    async fn segment(&self, req: &SegmentRequest) -> Result<(), EngineError>;

    /// Concatenates `inputs` in order into `output` without re-encoding.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EngineError>;

    /// Checks that the tool can be started.
    async fn probe(&self) -> Result<(), EngineError>;
}

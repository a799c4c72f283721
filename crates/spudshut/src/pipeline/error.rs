use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;
use crate::voice::VoiceError;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Input file '{0}' does not exist")]
    InputMissing(PathBuf),

    #[error("Segmenting produced no chunk files in '{0}'")]
    NoChunks(PathBuf),

    #[error("No audio files to join in '{0}'")]
    EmptyDirectory(PathBuf),

    #[error("Sequence {seq} appears more than once in '{dir}'")]
    DuplicateSequence { dir: PathBuf, seq: u32 },

    #[error("Found {found} converted chunks for {expected} chunks in '{dir}'")]
    ChunkCountMismatch {
        dir: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Job has no {0} recorded")]
    MissingPath(&'static str),

    #[error("Interrupted by shutdown")]
    Interrupted,

    #[error("Stage panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Converting '{chunk}' failed: {source}")]
    Voice {
        chunk: String,
        #[source]
        source: VoiceError,
    },

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error stops the whole run instead of one job.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Engine(e) => e.is_fatal(),
            Self::Voice { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub input_directory: String,
    pub work_directory: String,
    pub output_directory: String,
    /// SQLite file for the job store. Defaults to `~/.spudshut/data/spudshut.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Audio file extensions picked up by the ingest scanner (no dot).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    pub fn input_dir(&self) -> PathBuf {
        PathBuf::from(&self.input_directory)
    }

    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_directory)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_directory)
    }

    /// Configured database path, falling back to the per-user default.
    pub fn database_file(&self) -> Option<PathBuf> {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
    }
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_extensions() -> Vec<String> {
    ["m4a", "mp3", "mp4", "wav", "flac", "opus", "ogg", "aac"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_seconds")]
    pub chunk_seconds: u32,
    #[serde(default)]
    pub codec: Codec,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u8,
    /// Bitrate for lossy codecs, e.g. `24k`.
    #[serde(default)]
    pub bitrate: Option<String>,
    /// Let ffmpeg log at its default level instead of `error`.
    #[serde(default)]
    pub verbose: bool,
}

fn default_chunk_seconds() -> u32 {
    240
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_channels() -> u8 {
    1
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: default_chunk_seconds(),
            codec: Codec::default(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bitrate: None,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Target voice name or ID.
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Service output format string, e.g. `wav`, `mp3_44100_128`, `opus_48000_64`.
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Re-convert chunks even when the converted file already exists.
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "eleven_multilingual_sts_v2".to_string()
}

fn default_output_format() -> String {
    "wav".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("ELEVENLABS_API_KEY".to_string())
}

fn default_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: None,
            model: default_model(),
            output_format: default_output_format(),
            overwrite: false,
            api_key: None,
            api_key_file: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound for a single external call (one ffmpeg run, one API request).
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
    /// In-progress jobs untouched for this long are requeued.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_stage_timeout() -> u64 {
    30 * 60
}

fn default_stale_after() -> u64 {
    60 * 60
}

fn default_worker_count() -> usize {
    1
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            stage_timeout_secs: default_stage_timeout(),
            stale_after_secs: default_stale_after(),
            worker_count: default_worker_count(),
        }
    }
}

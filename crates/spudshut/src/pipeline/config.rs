use std::path::PathBuf;
use std::time::Duration;

use crate::codec::Codec;
use crate::config::Config;

/// Settings the stage executors need, detached from the file config.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub work_directory: PathBuf,
    pub output_directory: PathBuf,
    pub chunk_seconds: u32,
    pub codec: Codec,
    pub sample_rate: u32,
    pub channels: u8,
    pub bitrate: Option<String>,
    pub verbose: bool,
    /// Present when conversion is enabled.
    pub conversion: Option<ConversionSettings>,
    pub stage_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConversionSettings {
    /// Already resolved from a name, see [`crate::voice::resolve_voice_id`].
    pub voice_id: String,
    pub model: String,
    pub output_format: String,
    pub overwrite: bool,
}

impl PipelineConfig {
    /// Builds the stage settings. `voice_id` is required for conversion to
    /// be active; pass `None` to run chunk and join only.
    pub fn from_config(config: &Config, voice_id: Option<String>) -> Self {
        let conversion = match (config.conversion.enabled, voice_id) {
            (true, Some(voice_id)) => Some(ConversionSettings {
                voice_id,
                model: config.conversion.model.clone(),
                output_format: config.conversion.output_format.clone(),
                overwrite: config.conversion.overwrite,
            }),
            _ => None,
        };

        Self {
            work_directory: config.work_dir(),
            output_directory: config.output_dir(),
            chunk_seconds: config.chunking.chunk_seconds,
            codec: config.chunking.codec,
            sample_rate: config.chunking.sample_rate,
            channels: config.chunking.channels,
            bitrate: config.chunking.bitrate.clone(),
            verbose: config.chunking.verbose,
            conversion,
            stage_timeout: config.orchestrator.stage_timeout(),
        }
    }
}

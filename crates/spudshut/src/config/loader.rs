use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Returns the canonical config path: `~/.spudshut/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".spudshut").join("config.json"))
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "At least one input extension is required".to_string(),
        });
    }

    // Chunks and converted chunks are rescanned by sequence number, so they must
    // never share a directory with incoming files.
    if config.work_dir() == config.input_dir() {
        return Err(ConfigError::Validation {
            message: "work_directory must differ from input_directory".to_string(),
        });
    }
    if config.output_dir() == config.input_dir() {
        return Err(ConfigError::Validation {
            message: "output_directory must differ from input_directory".to_string(),
        });
    }

    if config.conversion.enabled {
        let voice = config.conversion.voice.as_deref().unwrap_or("").trim();
        if voice.is_empty() {
            return Err(ConfigError::Validation {
                message: "conversion.voice is required when conversion is enabled".to_string(),
            });
        }
    }

    if config.chunking.bitrate.is_some() && !config.chunking.codec.reencodes() {
        log::warn!("chunking.bitrate is ignored with the copy codec");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    #[test]
    fn test_load_minimal_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "input_directory": "/audio/in",
            "work_directory": "/audio/work",
            "output_directory": "/audio/out",
            "conversion": { "enabled": false }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.input_directory, "/audio/in");
        assert_eq!(config.chunking.chunk_seconds, 240);
        assert_eq!(config.chunking.codec, Codec::Flac);
        assert_eq!(config.chunking.sample_rate, 16_000);
        assert_eq!(config.chunking.channels, 1);
        assert_eq!(config.orchestrator.worker_count, 1);
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert!(config.extensions.iter().any(|e| e == "m4a"));
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "input_directory": "/audio/in",
            "work_directory": "/audio/work",
            "output_directory": "/audio/out",
            "database_path": "/audio/jobs.db",
            "extensions": ["m4a"],
            "chunking": { "chunk_seconds": 90, "codec": "opus", "bitrate": "24k" },
            "conversion": {
                "voice": "Rachel",
                "output_format": "opus_48000_64",
                "overwrite": true
            },
            "orchestrator": { "worker_count": 3, "stale_after_secs": 120 }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.chunking.codec, Codec::Opus);
        assert_eq!(config.chunking.bitrate.as_deref(), Some("24k"));
        assert_eq!(config.conversion.voice.as_deref(), Some("Rachel"));
        assert!(config.conversion.overwrite);
        assert_eq!(
            config.conversion.api_key_env.as_deref(),
            Some("ELEVENLABS_API_KEY")
        );
        assert_eq!(config.orchestrator.worker_count, 3);
        assert_eq!(config.orchestrator.stale_after().as_secs(), 120);
        assert_eq!(
            config.database_file(),
            Some(std::path::PathBuf::from("/audio/jobs.db"))
        );
    }

    #[test]
    fn test_invalid_version() {
        let config_json = r#"
        {
            "version": "2.0",
            "input_directory": "/in",
            "work_directory": "/work",
            "output_directory": "/out",
            "conversion": { "enabled": false }
        }
        "#;

        assert!(load_config_from_str(config_json).is_err());
    }

    #[test]
    fn test_unknown_codec_rejected_by_schema() {
        let config_json = r#"
        {
            "version": "1.0",
            "input_directory": "/in",
            "work_directory": "/work",
            "output_directory": "/out",
            "chunking": { "codec": "vorbis" },
            "conversion": { "enabled": false }
        }
        "#;

        let err = load_config_from_str(config_json).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_voice_required_when_converting() {
        let config_json = r#"
        {
            "version": "1.0",
            "input_directory": "/in",
            "work_directory": "/work",
            "output_directory": "/out"
        }
        "#;

        let err = load_config_from_str(config_json).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_work_directory_must_differ_from_input() {
        let config_json = r#"
        {
            "version": "1.0",
            "input_directory": "/in",
            "work_directory": "/in",
            "output_directory": "/out",
            "conversion": { "enabled": false }
        }
        "#;

        assert!(load_config_from_str(config_json).is_err());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let config_json = r#"
        {
            "version": "1.0",
            "input_directory": "/in",
            "work_directory": "/work",
            "output_directory": "/out",
            "rules": [],
            "conversion": { "enabled": false }
        }
        "#;

        assert!(load_config_from_str(config_json).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}

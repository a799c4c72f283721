//! Audio codecs supported when chunking.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Output codec for chunk files.
///
/// `Copy` keeps the source stream untouched and the chunk files inherit the
/// input's extension. Every other variant re-encodes with the sample rate,
/// channel count and optional bitrate from the chunking config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Flac,
    Opus,
    Wav,
    Mp3,
    Aac,
    Copy,
}

impl Codec {
    pub const ALL: [Codec; 6] = [
        Codec::Flac,
        Codec::Opus,
        Codec::Wav,
        Codec::Mp3,
        Codec::Aac,
        Codec::Copy,
    ];

    /// The ffmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Opus => "libopus",
            Self::Wav => "pcm_s16le",
            Self::Mp3 => "libmp3lame",
            Self::Aac => "aac",
            Self::Copy => "copy",
        }
    }

    /// Default extension for chunk files, without the dot.
    /// `None` means "keep the input file's extension".
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Flac => Some("flac"),
            Self::Opus => Some("opus"),
            Self::Wav => Some("wav"),
            Self::Mp3 => Some("mp3"),
            Self::Aac => Some("m4a"),
            Self::Copy => None,
        }
    }

    /// Whether sample rate, channel and bitrate parameters apply.
    pub fn reencodes(&self) -> bool {
        !matches!(self, Self::Copy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Opus => "opus",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownCodec(s.to_string()))
    }
}

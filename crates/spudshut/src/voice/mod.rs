//! Voice-conversion service seam.

mod elevenlabs;
mod format;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

pub use elevenlabs::ElevenLabsClient;
pub use format::ext_from_output_format;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("No API key configured: {0}")]
    MissingCredential(String),

    #[error("Authentication rejected ({status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("Voice '{0}' not found")]
    VoiceNotFound(String),

    #[error("Voice name '{name}' not found. Available voices: {available}")]
    UnknownVoice { name: String, available: String },

    #[error("Rate limited by voice service: {body}")]
    RateLimited { body: String },

    #[error("Voice service request timed out")]
    Timeout,

    #[error("Voice service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VoiceError {
    /// Errors that no job can get past: bad or missing credentials and
    /// voices the account cannot use.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential(_)
                | Self::Authentication { .. }
                | Self::VoiceNotFound(_)
                | Self::UnknownVoice { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
}

#[async_trait]
pub trait VoiceConverter: Send + Sync {
    async fn list_voices(&self) -> Result<Vec<Voice>, VoiceError>;

    /// Converts one audio file and returns the encoded result.
    async fn convert(
        &self,
        input: &Path,
        voice_id: &str,
        model: &str,
        output_format: &str,
    ) -> Result<Vec<u8>, VoiceError>;
}

static RE_VOICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{10,}$").unwrap());

fn is_id_like(ident: &str) -> bool {
    RE_VOICE_ID.is_match(ident)
}

/// Picks the voice ID for `ident` out of an already fetched listing.
///
/// ID-shaped strings are returned as-is. Anything else is matched against
/// voice names, ignoring case.
pub fn find_voice_id(voices: &[Voice], ident: &str) -> Result<String, VoiceError> {
    let ident = ident.trim();
    if is_id_like(ident) {
        return Ok(ident.to_string());
    }
    if let Some(voice) = voices.iter().find(|v| v.name.eq_ignore_ascii_case(ident)) {
        return Ok(voice.voice_id.clone());
    }

    let mut names: Vec<&str> = voices.iter().map(|v| v.name.as_str()).collect();
    names.sort_unstable();
    Err(VoiceError::UnknownVoice {
        name: ident.to_string(),
        available: names.join(", "),
    })
}

/// Resolves a voice name or ID, listing voices only when `ident` is a name.
pub async fn resolve_voice_id(
    converter: &dyn VoiceConverter,
    ident: &str,
) -> Result<String, VoiceError> {
    if is_id_like(ident.trim()) {
        return find_voice_id(&[], ident);
    }
    let voices = converter.list_voices().await?;
    find_voice_id(&voices, ident)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Listing(Vec<Voice>);

    #[async_trait]
    impl VoiceConverter for Listing {
        async fn list_voices(&self) -> Result<Vec<Voice>, VoiceError> {
            Ok(self.0.clone())
        }

        async fn convert(
            &self,
            _input: &Path,
            _voice_id: &str,
            _model: &str,
            _output_format: &str,
        ) -> Result<Vec<u8>, VoiceError> {
            unreachable!("resolution never converts")
        }
    }

    fn listing() -> Listing {
        Listing(vec![
            Voice {
                voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
                name: "Rachel".to_string(),
            },
            Voice {
                voice_id: "AZnzlk1XvdvUeBnXmlld".to_string(),
                name: "Domi".to_string(),
            },
        ])
    }

    #[tokio::test]
    async fn test_name_matches_case_insensitively() {
        let id = resolve_voice_id(&listing(), "rachel").await.unwrap();
        assert_eq!(id, "21m00Tcm4TlvDq8ikWAM");
    }

    #[tokio::test]
    async fn test_id_like_passes_through() {
        let id = resolve_voice_id(&Listing(Vec::new()), "abcdef123456")
            .await
            .unwrap();
        assert_eq!(id, "abcdef123456");
    }

    #[tokio::test]
    async fn test_unknown_name_lists_available() {
        let err = resolve_voice_id(&listing(), "Bob").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Voice name 'Bob' not found. Available voices: Domi, Rachel"
        );
    }

    #[test]
    fn test_id_like() {
        assert!(is_id_like("21m00Tcm4TlvDq8ikWAM"));
        assert!(!is_id_like("short1"));
        assert!(!is_id_like("has space in it"));
        assert!(!is_id_like("dash-separated-name"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(VoiceError::MissingCredential("ELEVENLABS_API_KEY".into()).is_fatal());
        assert!(VoiceError::Authentication {
            status: 401,
            body: String::new()
        }
        .is_fatal());
        assert!(!VoiceError::Timeout.is_fatal());
        assert!(!VoiceError::RateLimited {
            body: String::new()
        }
        .is_fatal());
    }
}

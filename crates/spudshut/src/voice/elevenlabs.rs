//! ElevenLabs speech-to-speech client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{Voice, VoiceConverter, VoiceError};

const API_KEY_HEADER: &str = "xi-api-key";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length for error bodies kept in messages and logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<Voice>,
}

pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl ElevenLabsClient {
    /// `request_timeout` bounds a whole request including the upload.
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, VoiceError> {
        // Each worker drives requests from its own runtime, so pooled
        // connections must not outlive the runtime that opened them.
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| VoiceError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn voices_url(&self) -> String {
        format!("{}/v1/voices", self.base_url)
    }

    fn convert_url(&self, voice_id: &str) -> String {
        format!("{}/v1/speech-to-speech/{}", self.base_url, voice_id)
    }

    async fn check(response: Response, voice_id: Option<&str>) -> Result<Response, VoiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = truncate_body(&response.text().await.unwrap_or_default());
        Err(status_error(status, body, voice_id))
    }
}

fn transport_error(e: reqwest::Error) -> VoiceError {
    if e.is_timeout() {
        VoiceError::Timeout
    } else {
        VoiceError::Http(e.to_string())
    }
}

fn status_error(status: StatusCode, body: String, voice_id: Option<&str>) -> VoiceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VoiceError::Authentication {
            status: status.as_u16(),
            body,
        },
        StatusCode::NOT_FOUND => match voice_id {
            Some(id) => VoiceError::VoiceNotFound(id.to_string()),
            None => VoiceError::Api {
                status: status.as_u16(),
                body,
            },
        },
        StatusCode::TOO_MANY_REQUESTS => VoiceError::RateLimited { body },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => VoiceError::Timeout,
        _ => VoiceError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl VoiceConverter for ElevenLabsClient {
    async fn list_voices(&self) -> Result<Vec<Voice>, VoiceError> {
        let response = self
            .client
            .get(self.voices_url())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response, None).await?;

        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Http(format!("Failed to parse voice list: {}", e)))?;
        debug!("Voice service returned {} voices", parsed.voices.len());
        Ok(parsed.voices)
    }

    async fn convert(
        &self,
        input: &Path,
        voice_id: &str,
        model: &str,
        output_format: &str,
    ) -> Result<Vec<u8>, VoiceError> {
        let audio = tokio::fs::read(input).await.map_err(|e| VoiceError::Io {
            path: input.to_path_buf(),
            source: e,
        })?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let part = Part::bytes(audio)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(transport_error)?;
        let form = Form::new()
            .part("audio", part)
            .text("model_id", model.to_string());

        let response = self
            .client
            .post(self.convert_url(voice_id))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .query(&[("output_format", output_format)])
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response, Some(voice_id)).await?;

        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ElevenLabsClient {
        ElevenLabsClient::new(
            "https://api.example.test/",
            SecretString::from("key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let c = client();
        assert_eq!(c.voices_url(), "https://api.example.test/v1/voices");
        assert_eq!(
            c.convert_url("abc123"),
            "https://api.example.test/v1/speech-to-speech/abc123"
        );
    }

    #[test]
    fn test_status_mapping() {
        let auth = status_error(StatusCode::UNAUTHORIZED, "nope".into(), None);
        assert!(matches!(auth, VoiceError::Authentication { status: 401, .. }));
        assert!(auth.is_fatal());

        let missing = status_error(StatusCode::NOT_FOUND, String::new(), Some("v1"));
        assert!(matches!(missing, VoiceError::VoiceNotFound(ref id) if id == "v1"));

        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down".into(), None);
        assert!(matches!(limited, VoiceError::RateLimited { .. }));
        assert!(!limited.is_fatal());

        let server = status_error(StatusCode::BAD_GATEWAY, "oops".into(), Some("v1"));
        assert!(matches!(server, VoiceError::Api { status: 502, .. }));
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() < long.len());
    }
}

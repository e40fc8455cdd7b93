//! ElevenLabs text-to-speech adapter.
//!
//! `POST {base}/v1/text-to-speech/{voice_id}?output_format=...` with the
//! `xi-api-key` header and a `{text, model_id}` JSON body. The response body
//! is the encoded audio.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use super::{SynthesisError, TextToSpeech};
use crate::config::TtsConfig;
use crate::error::{LipSyncError, Result};

/// Maximum number of error-body characters kept in a [`SynthesisError`].
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// ElevenLabs HTTP client.
pub struct ElevenLabsTts {
    config: TtsConfig,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ElevenLabsTts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsTts")
            .field("base_url", &self.config.api_base_url)
            .field("voice_id", &self.config.voice_id)
            .field("model_id", &self.config.model_id)
            .finish_non_exhaustive()
    }
}

impl ElevenLabsTts {
    /// Create a client with an explicit API key.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::Config`] if the key is blank or the HTTP
    /// client cannot be built.
    pub fn new(config: TtsConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LipSyncError::Config("ElevenLabs API key is empty".to_owned()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| LipSyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    /// Create a client reading the API key from the variable named by
    /// `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::Config`] if the variable is unset or blank.
    pub fn from_config(config: TtsConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(LipSyncError::Config(format!(
                "{} is not set; ElevenLabs synthesis needs an API key",
                config.api_key_env
            )));
        }
        Self::new(config, api_key)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> SynthesisError {
        let message = extract_error_message(body);
        match status.as_u16() {
            429 => SynthesisError::rate_limited(429, message),
            code => SynthesisError::provider(Some(code), message),
        }
    }
}

/// Pull `detail.message` (or `detail` as a string) out of an error body.
fn extract_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let detail = parsed.as_ref().and_then(|v| v.get("detail"));
    let message = detail
        .and_then(|d| d.get("message").and_then(|m| m.as_str()).or_else(|| d.as_str()))
        .unwrap_or(body);
    message.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str) -> std::result::Result<Bytes, SynthesisError> {
        let url = self.endpoint();
        debug!(url = %url, chars = text.chars().count(), "requesting ElevenLabs synthesis");

        let response = self
            .client
            .post(&url)
            .query(&[("output_format", self.config.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&SynthesisRequest {
                text,
                model_id: &self.config.model_id,
            })
            .send()
            .await
            .map_err(|e| SynthesisError::transport(format!("ElevenLabs request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body));
        }

        response
            .bytes()
            .await
            .map_err(|e| SynthesisError::transport(format!("ElevenLabs response body: {e}")))
    }
}

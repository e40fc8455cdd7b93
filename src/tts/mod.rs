//! Text-to-speech synthesis.
//!
//! [`TextToSpeech`] is the provider capability: text in, encoded audio out.
//! [`SpeechSynthesizer`] wraps a provider with the rate-limit retry policy
//! and writes the result to a message's synthesized-audio artifact.

pub mod elevenlabs;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

pub use elevenlabs::ElevenLabsTts;

/// Default number of provider calls per message.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How a synthesis call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisFailureKind {
    /// The provider asked us to slow down. Retryable.
    RateLimited,
    /// The provider rejected the request.
    ProviderError,
    /// No provider response was received.
    TransportError,
}

impl fmt::Display for SynthesisFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RateLimited => "rate limited",
            Self::ProviderError => "provider error",
            Self::TransportError => "transport error",
        })
    }
}

/// Classified synthesis failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}{}: {cause}", status_suffix(.status))]
pub struct SynthesisError {
    /// Failure classification.
    pub kind: SynthesisFailureKind,
    /// HTTP status reported by the provider, when there was one.
    pub status: Option<u16>,
    /// Provider or transport message.
    pub cause: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl SynthesisError {
    /// Rate-limit failure with the provider's status code.
    pub fn rate_limited(status: u16, cause: impl Into<String>) -> Self {
        Self {
            kind: SynthesisFailureKind::RateLimited,
            status: Some(status),
            cause: cause.into(),
        }
    }

    /// Non-retryable provider rejection.
    pub fn provider(status: Option<u16>, cause: impl Into<String>) -> Self {
        Self {
            kind: SynthesisFailureKind::ProviderError,
            status,
            cause: cause.into(),
        }
    }

    /// The request never got a provider response.
    pub fn transport(cause: impl Into<String>) -> Self {
        Self {
            kind: SynthesisFailureKind::TransportError,
            status: None,
            cause: cause.into(),
        }
    }

    /// Returns true if the same request may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        self.kind == SynthesisFailureKind::RateLimited
    }
}

/// Provider capability: turn text into encoded audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Synthesize `text`, returning the encoded audio bytes.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SynthesisError`]. Implementations must report
    /// rate limiting as [`SynthesisFailureKind::RateLimited`].
    async fn synthesize(&self, text: &str) -> std::result::Result<Bytes, SynthesisError>;
}

/// Delay between rate-limited attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay after every attempt. `0` retries immediately.
    Constant {
        /// Delay in milliseconds.
        #[serde(default)]
        delay_ms: u64,
    },
    /// Delay grows by `multiplier` after each attempt, capped at `max_delay_ms`.
    Exponential {
        /// Delay after the first failed attempt.
        initial_delay_ms: u64,
        /// Upper bound on any single delay.
        max_delay_ms: u64,
        /// Growth factor.
        multiplier: f64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Constant { delay_ms: 0 }
    }
}

/// Retry policy for rate-limited synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total provider calls allowed per message, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Constant { delay_ms } => Duration::from_millis(*delay_ms),
            Backoff::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(63) as i32;
                let scaled = (*initial_delay_ms as f64) * multiplier.max(1.0).powi(exponent);
                let capped = scaled.min(*max_delay_ms as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }

    /// Returns true if another attempt is allowed after `attempt` failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Result of one successful synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisReport {
    /// Size of the written artifact.
    pub bytes: u64,
    /// Provider calls made, including the successful one.
    pub attempts: u32,
    /// Wall time across all attempts.
    pub elapsed: Duration,
}

/// Provider plus retry policy, writing into artifact files.
pub struct SpeechSynthesizer {
    provider: Arc<dyn TextToSpeech>,
    retry: RetryPolicy,
}

impl SpeechSynthesizer {
    /// Create a synthesizer.
    pub fn new(provider: Arc<dyn TextToSpeech>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// The retry policy in effect.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Synthesize `text` into the file at `target`, replacing any previous file.
    ///
    /// Blank text is rejected without calling the provider. An empty artifact
    /// after a successful call is logged but not treated as a failure.
    ///
    /// # Errors
    ///
    /// - [`LipSyncError::Synthesis`](crate::error::LipSyncError::Synthesis)
    ///   for a non-retryable failure or once retries are exhausted.
    /// - [`LipSyncError::Io`](crate::error::LipSyncError::Io) if the
    ///   artifact cannot be written.
    pub async fn synthesize(&self, text: &str, target: &Path) -> Result<SynthesisReport> {
        if text.trim().is_empty() {
            return Err(SynthesisError::provider(None, "message text is empty").into());
        }

        let started = Instant::now();
        let mut attempt = 0;
        let audio = loop {
            attempt += 1;
            match self.provider.synthesize(text).await {
                Ok(audio) => break audio,
                Err(err) if err.is_retryable() && self.retry.allows_retry_after(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    debug!(provider = self.provider.name(), attempt, error = %err, "synthesis gave up");
                    return Err(err.into());
                }
            }
        };

        tokio::fs::write(target, &audio).await?;
        let bytes = tokio::fs::metadata(target).await?.len();
        let elapsed = started.elapsed();
        if bytes == 0 {
            warn!(file = %target.display(), "synthesized audio is empty");
        }
        info!(
            file = %target.display(),
            bytes,
            attempts = attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            "speech synthesized"
        );

        Ok(SynthesisReport {
            bytes,
            attempts: attempt,
            elapsed,
        })
    }
}

//! Error types for the lip-sync pipeline.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) accessible
//! via [`LipSyncError::code()`]. Per-message failures are recorded with their
//! code in the batch report, so codes are part of the public contract.

use std::path::PathBuf;

use crate::process::ProcessError;
use crate::tts::{SynthesisError, SynthesisFailureKind};

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// The TTS provider rejected the request with a rate limit.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// The TTS provider returned a non-rate-limit error.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";

    /// The TTS request never produced a provider response.
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";

    /// A required external tool could not be located.
    pub const TOOL_UNAVAILABLE: &str = "TOOL_UNAVAILABLE";

    /// Audio transcoding failed.
    pub const TRANSCODE_FAILED: &str = "TRANSCODE_FAILED";

    /// Phoneme extraction failed (after any fallback attempt).
    pub const EXTRACTION_FAILED: &str = "EXTRACTION_FAILED";

    /// An artifact could not be read or parsed during enrichment.
    pub const MALFORMED_ARTIFACT: &str = "MALFORMED_ARTIFACT";

    /// An external process failed outside of a more specific stage.
    pub const PROCESS_FAILED: &str = "PROCESS_FAILED";

    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The batch was cancelled before this work finished.
    pub const CANCELLED: &str = "CANCELLED";

    /// Filesystem error.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Top-level error type for the lip-sync pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LipSyncError {
    /// Speech synthesis failed (rate limited, provider or transport error).
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// An external tool could not be located.
    #[error("{tool} not found; searched: {searched}")]
    ToolUnavailable {
        /// Tool name (e.g. `rhubarb`, `ffmpeg`).
        tool: String,
        /// Human-readable list of the locations that were tried.
        searched: String,
    },

    /// The transcoding tool failed.
    #[error("transcode failed: {0}")]
    TranscodeFailed(#[source] ProcessError),

    /// The phoneme extraction tool failed.
    #[error("extraction failed: {0}")]
    ExtractionFailed(#[source] ProcessError),

    /// An artifact could not be read or parsed.
    #[error("malformed artifact {}: {reason}", path.display())]
    MalformedArtifact {
        /// The artifact that failed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// An external process failed outside a stage-specific context.
    #[error("process failed: {0}")]
    Process(#[from] ProcessError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Work was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LipSyncError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Synthesis(e) => match e.kind {
                SynthesisFailureKind::RateLimited => error_codes::RATE_LIMITED,
                SynthesisFailureKind::ProviderError => error_codes::PROVIDER_ERROR,
                SynthesisFailureKind::TransportError => error_codes::TRANSPORT_ERROR,
            },
            Self::ToolUnavailable { .. } => error_codes::TOOL_UNAVAILABLE,
            Self::TranscodeFailed(_) => error_codes::TRANSCODE_FAILED,
            Self::ExtractionFailed(_) => error_codes::EXTRACTION_FAILED,
            Self::MalformedArtifact { .. } => error_codes::MALFORMED_ARTIFACT,
            Self::Process(_) => error_codes::PROCESS_FAILED,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Cancelled => error_codes::CANCELLED,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Only rate-limited synthesis is retryable; every other failure is
    /// terminal for the owning message.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Synthesis(e) if e.is_retryable())
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LipSyncError>;

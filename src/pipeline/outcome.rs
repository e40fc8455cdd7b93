//! Batch results and per-message failure records.

use std::fmt;

use crate::error::LipSyncError;
use crate::message::Message;

/// Stage at which a message stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// Text-to-speech (stage 1).
    Synthesis,
    /// ffmpeg conversion.
    Transcode,
    /// Viseme extraction.
    Extraction,
    /// Reading artifacts into the message.
    Enrichment,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Synthesis => "synthesis",
            Self::Transcode => "transcode",
            Self::Extraction => "extraction",
            Self::Enrichment => "enrichment",
        })
    }
}

/// Why one message was left unenriched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFailure {
    /// Index of the message.
    pub index: usize,
    /// Stage that failed.
    pub stage: FailureStage,
    /// Stable error code (see [`crate::error::error_codes`]).
    pub code: &'static str,
    /// Rendered error.
    pub error: String,
}

impl MessageFailure {
    pub(crate) fn new(index: usize, stage: FailureStage, error: &LipSyncError) -> Self {
        Self {
            index,
            stage,
            code: error.code(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for MessageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message {} failed at {} [{}]: {}",
            self.index, self.stage, self.code, self.error
        )
    }
}

/// Processed batch plus the failures behind any unenriched messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Every input message, in input order.
    pub messages: Vec<Message>,
    /// One entry per unenriched message, ordered by index.
    pub failures: Vec<MessageFailure>,
}

impl BatchOutcome {
    /// Number of messages carrying both `audio` and `lipsync`.
    pub fn enriched_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_enriched()).count()
    }

    /// Returns true if no message failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failure record for `index`, if that message failed.
    pub fn failure_for(&self, index: usize) -> Option<&MessageFailure> {
        self.failures.iter().find(|f| f.index == index)
    }
}

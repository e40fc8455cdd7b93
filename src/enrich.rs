//! Attach audio and viseme timelines to messages.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use crate::artifacts::MessageArtifacts;
use crate::error::{LipSyncError, Result};
use crate::message::Message;
use crate::viseme::LipSyncTimeline;

/// Reads a message's artifacts into its `audio` and `lipsync` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageEnricher;

impl MessageEnricher {
    /// Create an enricher.
    pub fn new() -> Self {
        Self
    }

    /// Set `message.audio` and `message.lipsync` from `artifacts`.
    ///
    /// Both fields are written only if both artifacts load; on error the
    /// message is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::MalformedArtifact`] if either artifact cannot
    /// be read or the timeline does not parse.
    pub async fn enrich(&self, message: &mut Message, artifacts: &MessageArtifacts) -> Result<()> {
        let audio = tokio::fs::read(&artifacts.synthesized)
            .await
            .map_err(|e| LipSyncError::malformed(&artifacts.synthesized, e.to_string()))?;
        let raw = tokio::fs::read_to_string(&artifacts.timeline)
            .await
            .map_err(|e| LipSyncError::malformed(&artifacts.timeline, e.to_string()))?;
        let timeline = LipSyncTimeline::from_json_str(&raw)
            .map_err(|e| LipSyncError::malformed(&artifacts.timeline, e.to_string()))?;

        if !timeline.is_well_ordered() {
            warn!(index = message.index, "viseme cues overlap or are out of order");
        }
        debug!(
            index = message.index,
            audio_bytes = audio.len(),
            cues = timeline.mouth_cues.len(),
            "message enriched"
        );

        message.audio = Some(STANDARD.encode(&audio));
        message.lipsync = Some(timeline);
        Ok(())
    }
}

//! Viseme timelines for lip-sync animation.
//!
//! A viseme is the visual mouth shape shown while a sound is spoken. Timelines
//! come from Rhubarb Lip Sync's JSON export: a list of mouth cues, each a
//! `[start, end)` interval in seconds labelled with one of Rhubarb's nine
//! mouth shapes.

pub mod extractor;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use extractor::{
    ExtractionMode, MISSING_DEPENDENCY_PATTERNS, ToolResolver, VisemeExtractor,
    indicates_missing_recognizer,
};

/// Tolerance (seconds) when checking cue ordering.
const ORDER_EPSILON: f64 = 1e-6;

/// Rhubarb mouth shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouthShape {
    /// Closed mouth for /p/, /b/, /m/.
    A,
    /// Slightly open, clenched teeth (most consonants, /iː/).
    B,
    /// Open mouth (/ɛ/, /æ/).
    C,
    /// Wide open (/ɑ/).
    D,
    /// Slightly rounded (/ɒ/, /ɜ/).
    E,
    /// Puckered (/uː/, /oʊ/, /w/).
    F,
    /// Upper teeth on lower lip (/f/, /v/).
    G,
    /// Tongue raised behind teeth (long /l/).
    H,
    /// Idle / rest.
    X,
}

impl MouthShape {
    /// Short description of the shape, for logs and debugging overlays.
    pub fn description(self) -> &'static str {
        match self {
            Self::A => "closed",
            Self::B => "slightly open, teeth clenched",
            Self::C => "open",
            Self::D => "wide open",
            Self::E => "slightly rounded",
            Self::F => "puckered",
            Self::G => "teeth on lip",
            Self::H => "tongue raised",
            Self::X => "rest",
        }
    }

    /// Returns true for the shapes shown while no speech is audible.
    pub fn is_rest(self) -> bool {
        matches!(self, Self::X)
    }
}

/// One timed mouth shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthCue {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Shape displayed during `[start, end)`.
    pub value: MouthShape,
}

/// Metadata block of a Rhubarb JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMetadata {
    /// Audio file the timeline was computed from.
    #[serde(default)]
    pub sound_file: String,
    /// Audio duration in seconds.
    pub duration: f64,
    /// Fields this crate does not interpret, kept for the caller.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parsed viseme timeline, serialized back in Rhubarb's JSON shape.
///
/// Unknown keys at the top level or in `metadata` survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LipSyncTimeline {
    /// Export metadata, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TimelineMetadata>,
    /// Ordered mouth cues.
    pub mouth_cues: Vec<MouthCue>,
    /// Top-level fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LipSyncTimeline {
    /// Parse a Rhubarb JSON export.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed JSON or unknown shapes.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Timeline duration: metadata duration, else the last cue's end.
    pub fn duration(&self) -> f64 {
        self.metadata
            .as_ref()
            .map(|m| m.duration)
            .or_else(|| self.mouth_cues.last().map(|c| c.end))
            .unwrap_or(0.0)
    }

    /// Returns true if cues are non-overlapping and non-decreasing in start.
    ///
    /// Rhubarb output is expected to satisfy this; nothing in the pipeline
    /// enforces it.
    pub fn is_well_ordered(&self) -> bool {
        self.mouth_cues.iter().all(|c| c.start <= c.end + ORDER_EPSILON)
            && self
                .mouth_cues
                .windows(2)
                .all(|w| w[0].end <= w[1].start + ORDER_EPSILON)
    }

    /// Shape visible at time `t` (seconds), if any cue covers it.
    pub fn shape_at(&self, t: f64) -> Option<MouthShape> {
        self.mouth_cues
            .iter()
            .find(|c| c.start <= t && t < c.end)
            .map(|c| c.value)
    }
}

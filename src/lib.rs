//! Lipsync: batch speech synthesis with viseme timelines.
//!
//! Turns a batch of dialogue lines into speech audio plus mouth-shape timing
//! so an animated character can lip-sync while speaking.
//!
//! # Architecture
//!
//! Each message moves through external collaborators behind narrow traits:
//! - **Synthesis**: text → MP3 via a [`tts::TextToSpeech`] provider (ElevenLabs),
//!   retried while rate limited
//! - **Transcode**: MP3 → WAV via ffmpeg
//! - **Extraction**: WAV → viseme timeline via Rhubarb Lip Sync, with a
//!   fallback when the phonetic recognizer's resources are missing
//! - **Enrichment**: base64 audio and the parsed timeline are attached to the
//!   message
//!
//! [`LipSyncPipeline`] runs synthesis for the whole batch, waits, then runs
//! the remaining steps for the whole batch. Failures stay with their message.

pub mod artifacts;
pub mod config;
pub mod enrich;
pub mod error;
pub mod lipsync_dirs;
pub mod message;
pub mod pipeline;
pub mod process;
pub mod transcode;
pub mod tts;
pub mod viseme;

pub use artifacts::{ArtifactNamespace, MessageArtifacts};
pub use config::LipSyncConfig;
pub use error::{LipSyncError, Result};
pub use message::{Message, MessageBatch};
pub use pipeline::{BatchOutcome, FailureStage, LipSyncPipeline, MessageFailure};
pub use process::{CommandLine, ProcessError, ProcessRunner, SystemProcessRunner};
pub use tts::{ElevenLabsTts, RetryPolicy, SpeechSynthesizer, SynthesisError, TextToSpeech};
pub use viseme::{LipSyncTimeline, MouthCue, MouthShape, VisemeExtractor};

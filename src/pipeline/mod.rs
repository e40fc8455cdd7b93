//! Two-stage lip-sync pipeline.

pub mod coordinator;
pub mod outcome;

pub use coordinator::LipSyncPipeline;
pub use outcome::{BatchOutcome, FailureStage, MessageFailure};

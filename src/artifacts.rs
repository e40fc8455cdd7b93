//! Per-message artifact identities.
//!
//! Stages coordinate through files named `message_<index>` plus a
//! stage-specific extension. The namespace (root directory, optionally a
//! per-run subdirectory) is an explicit value handed to every stage, so two
//! batches only collide when they are given the same namespace.

use std::path::{Path, PathBuf};

/// Extension of the synthesized (provider output) audio.
pub const SYNTHESIZED_EXTENSION: &str = "mp3";

/// Extension of the canonical audio fed to the extractor.
pub const CANONICAL_EXTENSION: &str = "wav";

/// Extension of the extracted viseme timeline.
pub const TIMELINE_EXTENSION: &str = "json";

/// Directory in which one batch's artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNamespace {
    dir: PathBuf,
    run_id: Option<String>,
}

impl ArtifactNamespace {
    /// Namespace writing directly into `root`.
    ///
    /// Runs sharing the same root overwrite each other's files.
    pub fn shared(root: impl Into<PathBuf>) -> Self {
        Self {
            dir: root.into(),
            run_id: None,
        }
    }

    /// Namespace in `root/<run_id>/`.
    pub fn for_run(root: impl AsRef<Path>, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        Self {
            dir: root.as_ref().join(&run_id),
            run_id: Some(run_id),
        }
    }

    /// Namespace in `root/<fresh uuid>/`.
    pub fn fresh_run(root: impl AsRef<Path>) -> Self {
        Self::for_run(root, uuid::Uuid::new_v4().to_string())
    }

    /// Directory holding this namespace's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run identifier, when the namespace is isolated.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Artifact identities for the message at `index`.
    pub fn message(&self, index: usize) -> MessageArtifacts {
        let stem = format!("message_{index}");
        MessageArtifacts {
            synthesized: self.dir.join(format!("{stem}.{SYNTHESIZED_EXTENSION}")),
            canonical: self.dir.join(format!("{stem}.{CANONICAL_EXTENSION}")),
            timeline: self.dir.join(format!("{stem}.{TIMELINE_EXTENSION}")),
        }
    }

    /// Create the namespace directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub async fn ensure_exists(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }
}

/// The three files one message moves through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageArtifacts {
    /// Provider audio written by synthesis.
    pub synthesized: PathBuf,
    /// Transcoded audio read by extraction.
    pub canonical: PathBuf,
    /// Timeline written by extraction.
    pub timeline: PathBuf,
}

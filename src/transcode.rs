//! Audio transcoding with ffmpeg.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::TranscodeConfig;
use crate::error::{LipSyncError, Result};
use crate::process::{CommandLine, ProcessError, ProcessRunner};

/// Converts synthesized audio into the canonical format via ffmpeg.
pub struct AudioTranscoder {
    runner: Arc<dyn ProcessRunner>,
    ffmpeg: PathBuf,
}

impl AudioTranscoder {
    /// Create a transcoder.
    pub fn new(runner: Arc<dyn ProcessRunner>, config: &TranscodeConfig) -> Self {
        Self {
            runner,
            ffmpeg: config.ffmpeg_path.clone(),
        }
    }

    /// `ffmpeg -y -i <source> <target>`; the target extension picks the format.
    pub fn command(&self, source: &Path, target: &Path) -> CommandLine {
        CommandLine::new(&self.ffmpeg)
            .args(["-y", "-i"])
            .arg(source)
            .arg(target)
    }

    /// Transcode `source` into `target`, overwriting it.
    ///
    /// # Errors
    ///
    /// - [`LipSyncError::ToolUnavailable`] if ffmpeg cannot be found.
    /// - [`LipSyncError::TranscodeFailed`] if ffmpeg exits non-zero or times out.
    pub async fn transcode(&self, source: &Path, target: &Path) -> Result<()> {
        let started = Instant::now();
        self.runner
            .run(&self.command(source, target))
            .await
            .map_err(|e| self.classify(e))?;
        info!(
            source = %source.display(),
            target = %target.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "audio transcoded"
        );
        Ok(())
    }

    /// Run `ffmpeg -version` to confirm the tool is installed.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::ToolUnavailable`] if ffmpeg cannot be run.
    pub async fn check_available(&self) -> Result<()> {
        let cmd = CommandLine::new(&self.ffmpeg).arg("-version");
        match self.runner.run(&cmd).await {
            Ok(_) => Ok(()),
            Err(e) => Err(LipSyncError::ToolUnavailable {
                tool: "ffmpeg".to_owned(),
                searched: format!("{} ({e})", self.ffmpeg.display()),
            }),
        }
    }

    fn classify(&self, err: ProcessError) -> LipSyncError {
        if err.is_not_found() {
            LipSyncError::ToolUnavailable {
                tool: "ffmpeg".to_owned(),
                searched: self.ffmpeg.display().to_string(),
            }
        } else {
            LipSyncError::TranscodeFailed(err)
        }
    }
}

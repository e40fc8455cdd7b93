//! Viseme extraction via the Rhubarb Lip Sync command-line tool.
//!
//! The tool is located fresh on every call (explicit path, then the local
//! install directory, then `PATH`) so installing it mid-session works.
//! Extraction first runs with the fast phonetic recognizer; if that fails
//! because the tool's PocketSphinx resources are missing, it retries once
//! without requesting a recognizer.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::ExtractorConfig;
use crate::error::{LipSyncError, Result};
use crate::process::{CommandLine, ProcessRunner};

/// Case-insensitive substrings that mark a missing recognizer dependency.
///
/// Matched against the tool's error message and stderr. Extend this list when
/// the tool reports the same condition with new wording.
pub const MISSING_DEPENDENCY_PATTERNS: &[&str] =
    &["pocketsphinx", "cmudict", "speech recognition"];

/// Returns true if `diagnostic` says the recognizer's resources are missing.
pub fn indicates_missing_recognizer(diagnostic: &str) -> bool {
    let lower = diagnostic.to_lowercase();
    MISSING_DEPENDENCY_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Which invocation produced the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Fast run with the configured recognizer (`-r phonetic`).
    Primary,
    /// Retry without a recognizer flag.
    Fallback,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        })
    }
}

/// Locates the extraction tool.
#[derive(Debug, Clone)]
pub struct ToolResolver {
    explicit_path: Option<PathBuf>,
    local_install_dir: PathBuf,
    tool_name: String,
}

impl ToolResolver {
    /// Resolver from extractor configuration.
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            explicit_path: config.rhubarb_path.clone(),
            local_install_dir: config.local_install_dir.clone(),
            tool_name: config.tool_name.clone(),
        }
    }

    /// Ordered candidate paths.
    ///
    /// 1. Explicit configured path
    /// 2. `<local_install_dir>/<tool_name>`
    /// 3. `PATH` lookup via [`which::which`]
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(p) = &self.explicit_path {
            candidates.push(p.clone());
        }
        candidates.push(self.local_install_dir.join(&self.tool_name));
        if let Ok(found) = which::which(&self.tool_name) {
            candidates.push(found);
        }
        candidates
    }

    /// First candidate that exists as a file.
    ///
    /// The `PATH` walk and file checks run on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::ToolUnavailable`] naming every location tried.
    pub async fn resolve(&self) -> Result<PathBuf> {
        let resolver = self.clone();
        tokio::task::spawn_blocking(move || resolver.resolve_blocking())
            .await
            .map_err(|e| LipSyncError::Io(std::io::Error::other(e)))?
    }

    /// Synchronous form of [`resolve`](Self::resolve).
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::ToolUnavailable`] naming every location tried.
    pub fn resolve_blocking(&self) -> Result<PathBuf> {
        let candidates = self.candidates();
        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            return Ok(found.clone());
        }

        let mut searched: Vec<String> = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        if self.explicit_path.is_none() {
            searched.insert(0, "explicit path not configured".to_owned());
        }
        searched.push("PATH".to_owned());
        Err(LipSyncError::ToolUnavailable {
            tool: self.tool_name.clone(),
            searched: searched.join(", "),
        })
    }
}

/// Runs the extraction tool against canonical audio.
pub struct VisemeExtractor {
    runner: Arc<dyn ProcessRunner>,
    resolver: ToolResolver,
    primary_recognizer: String,
}

impl VisemeExtractor {
    /// Create an extractor.
    pub fn new(runner: Arc<dyn ProcessRunner>, config: &ExtractorConfig) -> Self {
        Self {
            runner,
            resolver: ToolResolver::from_config(config),
            primary_recognizer: config.primary_recognizer.clone(),
        }
    }

    /// The resolver used before every extraction.
    pub fn resolver(&self) -> &ToolResolver {
        &self.resolver
    }

    /// Build the tool invocation for `mode`.
    pub fn command(
        &self,
        tool: &Path,
        canonical: &Path,
        timeline: &Path,
        mode: ExtractionMode,
    ) -> CommandLine {
        let cmd = CommandLine::new(tool)
            .args(["-f", "json", "-o"])
            .arg(timeline)
            .arg(canonical);
        match mode {
            ExtractionMode::Primary => cmd.arg("-r").arg(&self.primary_recognizer),
            ExtractionMode::Fallback => cmd,
        }
    }

    /// Extract a viseme timeline from `canonical` into `timeline`.
    ///
    /// Returns the mode that succeeded.
    ///
    /// # Errors
    ///
    /// - [`LipSyncError::ToolUnavailable`] if the tool cannot be located
    ///   (checked before any invocation).
    /// - [`LipSyncError::ExtractionFailed`] if the primary run fails for any
    ///   other reason than a missing recognizer, or if the fallback fails.
    pub async fn extract(&self, canonical: &Path, timeline: &Path) -> Result<ExtractionMode> {
        let tool = self.resolver.resolve().await?;
        let started = Instant::now();

        let primary = self.command(&tool, canonical, timeline, ExtractionMode::Primary);
        let mode = match self.runner.run(&primary).await {
            Ok(_) => ExtractionMode::Primary,
            Err(err) if indicates_missing_recognizer(&err.diagnostic_text()) => {
                warn!(
                    tool = %tool.display(),
                    error = %err,
                    "recognizer resources missing; retrying without '-r {}'",
                    self.primary_recognizer
                );
                let fallback = self.command(&tool, canonical, timeline, ExtractionMode::Fallback);
                self.runner
                    .run(&fallback)
                    .await
                    .map_err(LipSyncError::ExtractionFailed)?;
                ExtractionMode::Fallback
            }
            Err(err) => return Err(LipSyncError::ExtractionFailed(err)),
        };

        info!(
            file = %canonical.display(),
            mode = %mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "lip sync extracted"
        );
        Ok(mode)
    }
}

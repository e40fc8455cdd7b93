//! Configuration types for the lip-sync pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::tts::RetryPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Text-to-speech provider settings.
    pub tts: TtsConfig,
    /// Retry policy for rate-limited synthesis.
    pub retry: RetryPolicy,
    /// Audio transcoding settings.
    pub transcode: TranscodeConfig,
    /// Viseme extraction tool settings.
    pub extractor: ExtractorConfig,
    /// Where per-message artifacts are written.
    pub artifacts: ArtifactConfig,
    /// Orchestrator settings.
    pub pipeline: PipelineConfig,
}

/// ElevenLabs text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Provider base URL (no trailing slash).
    pub api_base_url: String,
    /// Voice to synthesize with.
    pub voice_id: String,
    /// Provider model identifier.
    pub model_id: String,
    /// Provider output format; must be an MP3 variant so ffmpeg sees `.mp3`.
    pub output_format: String,
    /// Name of the environment variable that holds the API key.
    pub api_key_env: String,
    /// Per-request deadline in seconds.
    pub request_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.elevenlabs.io".to_owned(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_owned(),
            model_id: "eleven_multilingual_v2".to_owned(),
            output_format: "mp3_44100_128".to_owned(),
            api_key_env: "ELEVEN_LABS_API_KEY".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

/// Transcoder (ffmpeg) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// ffmpeg executable (bare name for PATH lookup, or a path).
    pub ffmpeg_path: PathBuf,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

/// Viseme extractor (Rhubarb Lip Sync) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Explicit path to the rhubarb executable. Tried first.
    pub rhubarb_path: Option<PathBuf>,
    /// Conventional local install directory, relative to the working directory.
    pub local_install_dir: PathBuf,
    /// Executable name looked up in the local dir and on `PATH`.
    pub tool_name: String,
    /// Recognizer requested in the primary (fast) mode.
    pub primary_recognizer: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            rhubarb_path: None,
            local_install_dir: PathBuf::from("bin"),
            tool_name: "rhubarb".to_owned(),
            primary_recognizer: "phonetic".to_owned(),
        }
    }
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Root directory for `message_<index>.*` files.
    pub root: PathBuf,
    /// Give every `process` call its own run directory under `root`.
    ///
    /// Off by default: repeated runs overwrite the same files.
    pub isolate_runs: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: crate::lipsync_dirs::artifacts_dir(),
            isolate_runs: false,
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on messages worked concurrently within a stage.
    ///
    /// `None` launches every message at once.
    pub max_concurrency: Option<usize>,
    /// Deadline applied to each external process, in seconds.
    pub process_timeout_secs: Option<u64>,
}

impl LipSyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::LipSyncError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::LipSyncError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::lipsync_dirs::config_file()
    }

    /// Apply overrides from the process environment.
    ///
    /// - `RHUBARB_PATH` sets `extractor.rhubarb_path`
    /// - `FFMPEG_PATH` sets `transcode.ffmpeg_path`
    /// - `LIPSYNC_ARTIFACTS_DIR` sets `artifacts.root`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var_os(key));
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<std::ffi::OsString>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        if let Some(path) = non_empty("RHUBARB_PATH") {
            self.extractor.rhubarb_path = Some(path);
        }
        if let Some(path) = non_empty("FFMPEG_PATH") {
            self.transcode.ffmpeg_path = path;
        }
        if let Some(path) = non_empty("LIPSYNC_ARTIFACTS_DIR") {
            self.artifacts.root = path;
        }
    }

    /// Validate values that serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::Config`](crate::error::LipSyncError::Config)
    /// describing the first invalid field.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::LipSyncError;

        if self.retry.max_attempts == 0 {
            return Err(LipSyncError::Config(
                "retry.max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.pipeline.max_concurrency == Some(0) {
            return Err(LipSyncError::Config(
                "pipeline.max_concurrency must be at least 1 when set".to_owned(),
            ));
        }
        if self.tts.voice_id.trim().is_empty() {
            return Err(LipSyncError::Config("tts.voice_id is empty".to_owned()));
        }
        if self.extractor.tool_name.trim().is_empty() {
            return Err(LipSyncError::Config(
                "extractor.tool_name is empty".to_owned(),
            ));
        }
        Ok(())
    }
}

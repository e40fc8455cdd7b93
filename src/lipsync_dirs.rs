//! Centralized directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (artifacts) | `~/Library/Application Support/lipsync/` | `~/.local/share/lipsync/` |
//! | Config | `~/Library/Application Support/lipsync/` | `~/.config/lipsync/` |
//!
//! # Environment Overrides
//!
//! - `LIPSYNC_DATA_DIR` overrides [`data_dir`]
//! - `LIPSYNC_CONFIG_DIR` overrides [`config_dir`]

use std::ffi::OsString;
use std::path::PathBuf;

const APP_DIR: &str = "lipsync";

fn resolve(override_dir: Option<OsString>, base: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Some(dir) = override_dir {
        return PathBuf::from(dir);
    }
    base.map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(fallback))
}

/// Application data root directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    resolve(
        std::env::var_os("LIPSYNC_DATA_DIR"),
        dirs::data_dir(),
        "/tmp/lipsync-data",
    )
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    resolve(
        std::env::var_os("LIPSYNC_CONFIG_DIR"),
        dirs::config_dir(),
        "/tmp/lipsync-config",
    )
}

/// Default artifact root (`data_dir()/audios/`).
#[must_use]
pub fn artifacts_dir() -> PathBuf {
    data_dir().join("audios")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

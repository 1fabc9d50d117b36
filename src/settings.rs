//! Persisted user settings.
//!
//! Stored as JSON in the platform config directory. Loaded once at startup
//! and handed to whatever needs it; a missing or unreadable file yields the
//! defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "yt-queue-downloader";
const SETTINGS_FILE: &str = "settings.json";
/// Overrides the directory holding `settings.json`
pub const CONFIG_DIR_ENV: &str = "YT_QUEUE_DOWNLOADER_CONFIG_DIR";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder used for the previous download
    pub last_save_path: String,
    /// Explicit ffmpeg binary instead of the one on `PATH`
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit yt-dlp binary instead of the bundled one
    pub ytdlp_path: Option<PathBuf>,
}

/// Directory holding `settings.json`.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

impl Settings {
    /// Loads from the default location, falling back to defaults.
    pub fn load() -> Self {
        match config_dir() {
            Some(dir) => Self::load_from(&dir),
            None => {
                tracing::warn!("no config directory available, using default settings");
                Self::default()
            }
        }
    }

    pub fn load_from(dir: &Path) -> Self {
        let path = dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("no settings at {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("ignoring malformed settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        self.save_to(&dir)
    }

    pub fn save_to(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating settings directory {}", dir.display()))?;
        let path = dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        tracing::debug!("settings saved to {}", path.display());
        Ok(())
    }
}

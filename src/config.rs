//! On-disk settings for the command-line front end

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::config::{APP_DIR, SETTINGS_FILENAME, STORAGE_FILENAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// JSON file holding profiles, rules and the schema marker
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// `trace`, `debug`, `info`, `warn` or `error`; `LOG_LEVEL` wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            log_level: default_log_level(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path.push(STORAGE_FILENAME);
    path
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// `settings.json` under the platform config directory
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push(SETTINGS_FILENAME);
        path
    }

    /// Load settings from the default location, creating the file if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Load settings from `path`, creating the file if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Settings file not found, creating default");
            let settings = Settings::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings JSON from {:?}", path))?;
        Ok(settings)
    }

    /// Write settings as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;
        Ok(())
    }
}

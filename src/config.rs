use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::matcher::MatchConfig;

/// Application configuration loaded from a TOML file.
/// Every field has a default, so the file is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Matcher thresholds, tie handling and similarity function.
    pub matching: MatchConfig,
}

impl AppConfig {
    /// Load config from `explicit` if given, else from
    /// `~/.config/djsync/config.toml`.
    ///
    /// An explicit file must exist and parse. A broken default file only logs a
    /// warning and falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                SyncError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            let config = Self::parse(&contents)
                .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
            log::info!("Loaded config from {}", path.display());
            return Ok(config);
        }

        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        Ok(config)
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Ok(Self::default())
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Ok(Self::default())
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse and validate TOML text.
    pub fn parse(contents: &str) -> std::result::Result<Self, String> {
        let config: AppConfig = toml::from_str(contents).map_err(|e| e.to_string())?;
        config.matching.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

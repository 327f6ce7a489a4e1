//! Persistent Settings Management
//!
//! Saves and loads the host configuration together with the fitting each
//! channel starts from.
//!
//! # Storage Locations
//! - Linux: `~/.config/howl/settings.json`
//! - Windows: `%APPDATA%\howl\settings.json`
//! - macOS: `~/Library/Application Support/howl/settings.json`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use howl_dsp::Fitting;

/// Root settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    pub config: HostConfig,
    /// Fitting shared by every channel; each channel is tagged with its ear
    pub fitting: Fitting,
}

impl Default for HostSettings {
    fn default() -> Self {
        let config = HostConfig::default();
        let fitting = Fitting::for_chunk(config.stream.chunk_size);
        Self { config, fitting }
    }
}

impl HostSettings {
    /// Load settings from the platform location, or return default if missing/corrupt
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("Could not determine config path, using default settings");
                Self::default()
            }
        }
    }

    /// Load settings from `path`, or return default if missing/corrupt
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::File::open(path) {
                Ok(file) => match serde_json::from_reader::<_, HostSettings>(file) {
                    Ok(settings) => match settings.config.validate() {
                        Ok(()) => {
                            info!("Settings loaded from {:?}", path);
                            return settings;
                        }
                        Err(e) => warn!("Ignoring invalid settings file: {}", e),
                    },
                    Err(e) => {
                        error!("Failed to parse settings file: {}", e);
                    }
                },
                Err(e) => {
                    error!("Failed to open settings file: {}", e);
                }
            }
        }

        info!("Using default settings");
        Self::default()
    }

    /// Save settings to the platform location
    pub fn save(&self) -> HostResult<()> {
        let path = Self::config_path()
            .ok_or_else(|| HostError::ConfigError("Could not determine config path".into()))?;
        self.save_to(&path)
    }

    /// Save settings to `path`
    pub fn save_to(&self, path: &Path) -> HostResult<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| HostError::ConfigError(e.to_string()))?;
        }

        let file = fs::File::create(path).map_err(|e| HostError::ConfigError(e.to_string()))?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| HostError::ConfigError(e.to_string()))?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Get the platform-specific configuration file path
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "howl", "howl")
            .map(|proj| proj.config_dir().join("settings.json"))
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Persisted user preferences
//!
//! Stored as pretty-printed JSON under the user config directory. The core
//! recording and capture types never read this; the command line front end
//! turns it into a [`MediaDestination`](crate::media::MediaDestination).

use crate::constants::{BitratePreset, app_info, encoding};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
    /// Mirror the camera feed horizontally (selfie mode)
    pub mirror_preview: bool,
    /// Folder recordings are written to; `None` uses the videos directory
    pub output_folder: Option<PathBuf>,
    /// Expected frame rate handed to the encoder
    pub frame_rate_hint: u32,
    /// Capture device id to prefer over automatic selection
    pub preferred_video_device: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bitrate_preset: BitratePreset::default(),
            mirror_preview: true,
            output_folder: None,
            frame_rate_hint: encoding::FRAME_RATE_HINT,
            preferred_video_device: None,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::APP_NAME).join("config.json"))
    }

    /// Load the config from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load the config from `path`
    ///
    /// A missing file yields defaults silently; an unreadable or invalid one
    /// yields defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config, using defaults");
                return Self::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
            Self::default()
        })
    }

    /// Save the config to the default location
    pub fn save(&self) -> AppResult<()> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("No config directory available".to_string()))?;
        self.save_to(&path)
    }

    /// Save the config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }
}

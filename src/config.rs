// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipeline tunables
//!
//! Flush/stop timeouts and the minimum artifact size are empirical and depend
//! on the kiosk hardware, so they live here rather than in the code paths that
//! use them. Every field has a default; a booth only needs to override what
//! differs on its platform.

use crate::constants::{self, BitratePreset};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Folder under the user config directory holding `config.json`
const CONFIG_DIR_NAME: &str = "booth-capture";

/// Placeholder clip settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaceholderConfig {
    /// Surface width
    pub width: u32,
    /// Surface height
    pub height: u32,
    /// Frames pushed to the encoder
    pub frames: u32,
    /// Text drawn onto the surface
    pub message: String,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            width: constants::placeholder::WIDTH,
            height: constants::placeholder::HEIGHT,
            frames: constants::placeholder::FRAMES,
            message: constants::placeholder::MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Delay before the first data request after the encoder starts
    pub initial_flush_delay_ms: u64,
    /// Period of automatic flush requests while recording
    pub flush_interval_ms: u64,
    /// Upper bound on waiting for the encoder's stopped notification
    pub stop_timeout_ms: u64,
    /// Artifacts smaller than this are treated as encoder failure
    pub min_artifact_bytes: usize,
    /// Refresh rate of the compositor's draw loop
    pub display_refresh_hz: u32,
    /// Largest surface the compositor will allocate
    pub max_surface_pixels: u64,
    /// Encoding format candidates in priority order
    pub format_candidates: Vec<String>,
    /// Video bitrate preset
    pub bitrate_preset: BitratePreset,
    /// Placeholder clip settings
    pub placeholder: PlaceholderConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            initial_flush_delay_ms: constants::timing::INITIAL_FLUSH_DELAY.as_millis() as u64,
            flush_interval_ms: constants::timing::FLUSH_INTERVAL.as_millis() as u64,
            stop_timeout_ms: constants::timing::STOP_TIMEOUT.as_millis() as u64,
            min_artifact_bytes: constants::artifact::MIN_ARTIFACT_BYTES,
            display_refresh_hz: constants::timing::DISPLAY_REFRESH_HZ,
            max_surface_pixels: constants::MAX_SURFACE_PIXELS,
            format_candidates: constants::FORMAT_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            bitrate_preset: BitratePreset::default(),
            placeholder: PlaceholderConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded capture config");
        Ok(config)
    }

    /// Load the user config file, or defaults if it is missing or broken
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid capture config");
                Self::default()
            }
        }
    }

    /// `~/.config/booth-capture/config.json` on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("config.json"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("flushIntervalMs", self.flush_interval_ms),
            ("stopTimeoutMs", self.stop_timeout_ms),
            ("displayRefreshHz", self.display_refresh_hz as u64),
            ("maxSurfacePixels", self.max_surface_pixels),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.placeholder.width == 0 || self.placeholder.height == 0 {
            return Err(ConfigError::Invalid {
                field: "placeholder",
                reason: "surface must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn initial_flush_delay(&self) -> Duration {
        Duration::from_millis(self.initial_flush_delay_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Tick period of the display-synchronized draw loop
    pub fn display_tick(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.display_refresh_hz.max(1) as f64)
    }
}

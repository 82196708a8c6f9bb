// SPDX-License-Identifier: GPL-3.0-only

//! Bridge configuration
//!
//! Configuration is plain JSON. Every field has a default so partial files load.

use crate::constants::{timing, video};
use crate::engine::InputDescriptor;
use crate::errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Canvas and output video settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    /// Frame rate numerator
    pub fps_num: u32,
    /// Frame rate denominator
    pub fps_den: u32,
}

impl VideoSettings {
    /// Reject zero dimensions, a zero frame rate or one above [`video::MAX_FPS`]
    pub fn validate(&self) -> BridgeResult<()> {
        if self.base_width == 0
            || self.base_height == 0
            || self.output_width == 0
            || self.output_height == 0
        {
            return Err(BridgeError::Unsupported(format!(
                "resolution {}x{} -> {}x{}",
                self.base_width, self.base_height, self.output_width, self.output_height
            )));
        }
        if self.fps_num == 0
            || self.fps_den == 0
            || self.fps_num as u64 > video::MAX_FPS * self.fps_den as u64
        {
            return Err(BridgeError::Unsupported(format!(
                "frame rate {}/{}",
                self.fps_num, self.fps_den
            )));
        }
        Ok(())
    }

    /// Duration of one output frame
    pub fn frame_interval(&self) -> std::time::Duration {
        let den = self.fps_den.max(1) as u64;
        let num = self.fps_num.max(1) as u64;
        std::time::Duration::from_micros((1_000_000 * den / num).max(1_000_000 / video::MAX_FPS))
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            base_width: video::DEFAULT_BASE_WIDTH,
            base_height: video::DEFAULT_BASE_HEIGHT,
            output_width: video::DEFAULT_OUTPUT_WIDTH,
            output_height: video::DEFAULT_OUTPUT_HEIGHT,
            fps_num: video::DEFAULT_FPS_NUM,
            fps_den: video::DEFAULT_FPS_DEN,
        }
    }
}

/// Simulated output-mix transition latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub start_delay_ms: u64,
    pub stop_delay_ms: u64,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            start_delay_ms: timing::DEFAULT_OUTPUT_START_DELAY_MS,
            stop_delay_ms: timing::DEFAULT_OUTPUT_STOP_DELAY_MS,
        }
    }
}

/// Devices offered by the software engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareCatalog {
    pub video_devices: Vec<InputDescriptor>,
    pub audio_devices: Vec<InputDescriptor>,
    /// Duration reported for every media file
    pub media_duration_ms: u64,
}

impl Default for SoftwareCatalog {
    fn default() -> Self {
        Self {
            video_devices: vec![
                InputDescriptor::new("test-pattern-0", "Test Pattern Camera"),
                InputDescriptor::new("test-pattern-1", "Test Pattern Camera 2"),
            ],
            audio_devices: vec![InputDescriptor::new("tone-0", "Sine Tone Input")],
            media_duration_ms: timing::DEFAULT_MEDIA_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Video settings passed to engine startup
    pub video: VideoSettings,
    /// Output mix timing
    pub output: OutputSettings,
    /// Software engine device catalog
    pub software: SoftwareCatalog,
    /// Cadence of volume-meter samples
    pub volume_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video: VideoSettings::default(),
            output: OutputSettings::default(),
            software: SoftwareCatalog::default(),
            volume_interval_ms: timing::DEFAULT_VOLUME_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Default location: `<config dir>/scenebridge/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scenebridge").join("config.json"))
    }

    /// Load a config file
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.video.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it is absent or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Save as pretty-printed JSON, creating the parent directory
    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }
}

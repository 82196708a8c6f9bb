// SPDX-License-Identifier: GPL-3.0-only

//! Bridge-wide constants

use std::time::Duration;

/// Default video settings applied at engine startup
pub mod video {
    /// Canvas width the engine composes at
    pub const DEFAULT_BASE_WIDTH: u32 = 1280;

    /// Canvas height the engine composes at
    pub const DEFAULT_BASE_HEIGHT: u32 = 720;

    /// Scaled output width
    pub const DEFAULT_OUTPUT_WIDTH: u32 = 1280;

    /// Scaled output height
    pub const DEFAULT_OUTPUT_HEIGHT: u32 = 720;

    /// Frame rate numerator
    pub const DEFAULT_FPS_NUM: u32 = 30;

    /// Frame rate denominator
    pub const DEFAULT_FPS_DEN: u32 = 1;

    /// Highest frame rate the canvas accepts
    pub const MAX_FPS: u64 = 240;

    /// Frame size produced by synthetic capture devices and media sources
    pub const PATTERN_WIDTH: u32 = 320;
    pub const PATTERN_HEIGHT: u32 = 180;
}

/// Values returned across the command surface when a call fails
///
/// Handles, texture ids and volume-meter tokens are always positive when valid.
/// Item ids start at zero, so their failure value is negative.
pub mod sentinel {
    /// Failed texture registration
    pub const INVALID_TEXTURE: i64 = 0;

    /// Failed `add_source`
    pub const INVALID_ITEM_ID: i64 = -1;

    /// Failed duration or time query
    pub const INVALID_TIME: i64 = -1;

    /// Failed volume-meter registration
    pub const INVALID_TOKEN: i64 = -1;

    /// Unknown media state code
    pub const UNKNOWN_STATE: i32 = 0;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Window over which a frame sink measures its frames-per-second
    pub const FPS_WINDOW: Duration = Duration::from_secs(1);

    /// Log delivered frame counts every N frames (trace level)
    pub const FRAME_LOG_INTERVAL: u64 = 300;

    /// Simulated latency of the output mix reaching Running
    pub const DEFAULT_OUTPUT_START_DELAY_MS: u64 = 150;

    /// Simulated latency of the output mix reaching Stopped
    pub const DEFAULT_OUTPUT_STOP_DELAY_MS: u64 = 100;

    /// How long shutdown waits for the output mix to report Stopped
    pub const SHUTDOWN_OUTPUT_WAIT: Duration = Duration::from_secs(2);

    /// Cadence of synthetic volume-meter samples
    pub const DEFAULT_VOLUME_INTERVAL_MS: u64 = 50;

    /// Duration reported for media files by the software engine
    pub const DEFAULT_MEDIA_DURATION_MS: u64 = 60_000;
}

/// Input type identifiers understood by the engines
pub mod input_types {
    /// Camera / capture card input
    pub const VIDEO_CAPTURE: &str = "video_capture";

    /// Microphone / line input
    pub const AUDIO_CAPTURE: &str = "audio_capture";

    /// Local media file playback
    pub const MEDIA: &str = "media_source";

    /// Still image
    pub const IMAGE: &str = "image_source";

    /// Solid color fill
    pub const COLOR: &str = "color_source";
}

/// Supported file formats for file-backed sources
pub mod file_formats {
    /// Image file extensions (lowercase)
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Media file extensions (lowercase)
    pub const MEDIA_EXTENSIONS: &[&str] =
        &["mp4", "mkv", "webm", "avi", "mov", "mp3", "wav", "m4a", "flac"];

    /// Check if a path has one of the given extensions (case-insensitive)
    pub fn has_extension(path: &std::path::Path, extensions: &[&str]) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Volume meter defaults
pub mod volume {
    /// Channel count reported for capture and media sources
    pub const DEFAULT_CHANNELS: usize = 2;

    /// Level floor in dBFS reported for silence
    pub const SILENCE_DB: f32 = -60.0;
}

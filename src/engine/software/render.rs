// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic frame and level generation

use crate::capture::{FrameBuffer, PixelFormat};
use crate::constants::volume;
use crate::engine::VolumeLevels;
use crate::errors::{BridgeError, BridgeResult};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// SMPTE-style bar colors, BGRA
const BARS: [[u8; 4]; 7] = [
    [192, 192, 192, 255],
    [0, 192, 192, 255],
    [192, 192, 0, 255],
    [0, 192, 0, 255],
    [192, 0, 192, 255],
    [0, 0, 192, 255],
    [192, 0, 0, 255],
];

/// Number of pre-rendered bar phases a pattern cycles through
pub const PATTERN_PHASES: usize = 8;

/// Vertical color bars scrolled horizontally by `phase / PATTERN_PHASES`
///
/// One row is built and repeated, every row of a bar frame is identical.
pub fn color_bars(width: u32, height: u32, phase: usize) -> Arc<[u8]> {
    let width = width as usize;
    let shift = width * (phase % PATTERN_PHASES) / PATTERN_PHASES;
    let mut row = Vec::with_capacity(width * 4);
    for x in 0..width {
        let bar = ((x + shift) % width.max(1)) * BARS.len() / width.max(1);
        row.extend_from_slice(&BARS[bar]);
    }
    row.repeat(height as usize).into()
}

/// Every phase of the bar pattern, rendered once
pub fn bar_frames(width: u32, height: u32) -> Vec<Arc<[u8]>> {
    (0..PATTERN_PHASES)
        .map(|phase| color_bars(width, height, phase))
        .collect()
}

/// Solid BGRA fill
pub fn solid(width: u32, height: u32, bgra: [u8; 4]) -> Arc<[u8]> {
    bgra.repeat(width as usize * height as usize).into()
}

/// Decode an image file into an RGBA frame
pub fn load_image(path: &Path) -> BridgeResult<FrameBuffer> {
    let image = image::open(path).map_err(|e| {
        BridgeError::DeviceUnavailable(format!("cannot decode {}: {}", path.display(), e))
    })?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    debug!(path = %path.display(), width, height, "Decoded image source");
    Ok(FrameBuffer::new(
        width,
        height,
        PixelFormat::RGBA,
        rgba.into_raw(),
    ))
}

/// Synthetic tone levels at sample `tick`
///
/// Magnitude swings between -26 and -14 dBFS, peaks sit 6 dB above it.
pub fn tone_levels(tick: u64, channels: usize) -> VolumeLevels {
    let mut levels = VolumeLevels::default();
    for channel in 0..channels {
        let phase = tick as f32 * 0.2 + channel as f32 * 0.5;
        let magnitude = -20.0 + 6.0 * phase.sin();
        let peak = (magnitude + 6.0).min(0.0);
        levels.magnitude.push(magnitude);
        levels.peak.push(peak);
        levels.input_peak.push(peak);
    }
    levels
}

/// Floor levels for a silent source
pub fn silence(channels: usize) -> VolumeLevels {
    VolumeLevels {
        magnitude: vec![volume::SILENCE_DB; channels],
        peak: vec![volume::SILENCE_DB; channels],
        input_peak: vec![volume::SILENCE_DB; channels],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_fill_frame() {
        let data = color_bars(14, 3, 0);
        assert_eq!(data.len(), 14 * 3 * 4);
        assert_eq!(&data[..4], &BARS[0]);
        // Rows repeat
        assert_eq!(&data[..14 * 4], &data[14 * 4..28 * 4]);
    }

    #[test]
    fn test_phases_differ() {
        let frames = bar_frames(64, 1);
        assert_eq!(frames.len(), PATTERN_PHASES);
        assert_ne!(frames[0], frames[1]);
    }

    #[test]
    fn test_levels_shape() {
        let levels = tone_levels(3, 2);
        assert_eq!(levels.channels(), 2);
        assert!(levels.magnitude.iter().all(|m| (-26.0..=-14.0).contains(m)));
        assert!(levels.peak.iter().all(|p| *p <= 0.0));
        assert_eq!(silence(2).peak, vec![volume::SILENCE_DB; 2]);
    }

    #[test]
    fn test_missing_image_is_device_unavailable() {
        assert!(matches!(
            load_image(Path::new("/nonexistent/a.png")),
            Err(BridgeError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let frame = load_image(&path).unwrap();
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(&frame.data[..4], &[1, 2, 3, 255]);
        assert!(frame.is_complete());
    }
}

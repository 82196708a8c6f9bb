// SPDX-License-Identifier: GPL-3.0-only

//! Frame and texture types shared by engines and renderers

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Pixel format of a delivered frame
///
/// Engines convert before delivery; the bridge never transcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// BGRA - 32-bit with alpha (B G R A byte order), the usual texture upload format
    BGRA,
    /// NV12 - Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    NV12,
    /// I420 - Planar 4:2:0 (separate Y, U, V planes)
    I420,
}

impl PixelFormat {
    /// Check if this format is a YUV format
    pub fn is_yuv(&self) -> bool {
        matches!(self, Self::NV12 | Self::I420)
    }

    /// Bytes per pixel of the first plane
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::RGBA | Self::BGRA => 4,
            Self::NV12 | Self::I420 => 1,
        }
    }

    /// Minimum buffer size for a frame of this format with the given stride
    pub fn frame_size(&self, stride: u32, height: u32) -> usize {
        let luma = stride as usize * height as usize;
        if self.is_yuv() {
            // 4:2:0 chroma adds half the luma size
            luma + luma.div_ceil(2)
        } else {
            luma
        }
    }
}

/// One decoded frame
///
/// Pixel data is reference counted so a frame can sit in a sink while the
/// consumer copies it out without duplicating the allocation.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    /// Bytes per row of the first plane, may include padding
    pub stride: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    /// When the producer handed the frame over (for latency diagnostics)
    pub captured_at: Instant,
    /// Engine presentation timestamp
    pub timestamp_ns: u64,
}

impl FrameBuffer {
    /// Wrap tightly packed pixel data
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel() as u32,
            format,
            data: data.into(),
            captured_at: Instant::now(),
            timestamp_ns: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Whether `data` is large enough for the declared geometry
    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.format.frame_size(self.stride, self.height)
    }
}

/// Texture identifier handed out by a [`super::TextureRegistry`]
///
/// Valid identifiers are positive. The identifier is stable for the whole
/// lifetime of the source it was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureId(pub i64);

impl std::fmt::Display for TextureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters kept by a frame sink
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Frames handed over by the producer
    pub samples: u64,
    /// Frames read by the consumer
    pub copies: u64,
    /// Frames overwritten before the consumer read them
    pub dropped: u64,
    /// Producer frame rate measured over the last full window
    pub fps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormat::BGRA.frame_size(16, 4), 64);
        assert_eq!(PixelFormat::NV12.frame_size(4, 4), 24);
    }

    #[test]
    fn test_incomplete_frame_detected() {
        let frame = FrameBuffer::new(2, 2, PixelFormat::RGBA, vec![0u8; 15]);
        assert_eq!(frame.stride, 8);
        assert!(!frame.is_complete());

        let frame = FrameBuffer::new(2, 2, PixelFormat::RGBA, vec![0u8; 16]);
        assert!(frame.is_complete());
    }
}

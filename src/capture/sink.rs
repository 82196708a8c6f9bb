// SPDX-License-Identifier: GPL-3.0-only

//! Per-source frame sink
//!
//! A sink holds at most one pending frame. The producer replaces it on every
//! delivery (latest-wins) and the consumer reads whatever is newest. The slot
//! is a `parking_lot` mutex around an `Arc` pointer, held only for the swap or
//! the clone. The producer only ever `try_lock`s it: a frame that arrives
//! while a reader holds the slot is counted as dropped, never waited on.

use super::texture::{PixelBufferProvider, TextureRegistry, TextureSource};
use super::types::{CaptureStats, FrameBuffer, TextureId};
use crate::constants::timing;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;
use tracing::{debug, trace};

/// Rolling frames-per-second measurement
///
/// The rate is recomputed once per elapsed [`timing::FPS_WINDOW`].
#[derive(Debug)]
struct FpsCounter {
    window_start: Instant,
    frames_in_window: u64,
    fps: f64,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames_in_window: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self, now: Instant) {
        self.frames_in_window += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= timing::FPS_WINDOW {
            self.fps = self.frames_in_window as f64 / elapsed.as_secs_f64();
            self.frames_in_window = 0;
            self.window_start = now;
        }
    }
}

/// Frame sink bound to one frame-producing source
pub struct FrameSink {
    uuid: String,
    pending: Mutex<Option<Arc<FrameBuffer>>>,
    /// Pending frame has not been read yet
    unread: AtomicBool,
    /// Set once the sink is unregistered; later deliveries are discarded
    detached: AtomicBool,
    texture_id: OnceLock<TextureId>,
    registry: Weak<dyn TextureRegistry>,
    samples: AtomicU64,
    copies: AtomicU64,
    dropped: AtomicU64,
    /// Producer-only
    fps_counter: Mutex<FpsCounter>,
    /// Last measured rate, as `f64` bits
    fps: AtomicU64,
}

impl FrameSink {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            pending: Mutex::new(None),
            unread: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            texture_id: OnceLock::new(),
            registry: Weak::<super::texture::MemoryTextureRegistry>::new(),
            samples: AtomicU64::new(0),
            copies: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            fps_counter: Mutex::new(FpsCounter::new()),
            fps: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Create a sink and register it as a texture provider
    ///
    /// Returns `None` when the registry refuses the texture.
    pub fn registered(
        uuid: impl Into<String>,
        registry: &Arc<dyn TextureRegistry>,
    ) -> Option<Arc<Self>> {
        let mut sink = Self::new(uuid);
        sink.registry = Arc::downgrade(registry);
        let sink = Arc::new(sink);
        Arc::clone(&sink).register_texture(registry.as_ref())?;
        Some(sink)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Stop accepting frames and drop the pending one
    ///
    /// The flag is checked under the slot lock, so a racing delivery either
    /// lands before the clear or is discarded.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        let mut slot = self.pending.lock();
        slot.take();
        self.unread.store(false, Ordering::Release);
        drop(slot);
        debug!(uuid = %self.uuid, "Frame sink detached");
    }

    /// Take the pending frame, leaving the slot empty
    pub fn take_frame(&self) -> Option<Arc<FrameBuffer>> {
        let frame = {
            let mut slot = self.pending.lock();
            self.unread.store(false, Ordering::Release);
            slot.take()
        };
        if frame.is_some() {
            self.copies.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            samples: self.samples.load(Ordering::Relaxed),
            copies: self.copies.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            fps: f64::from_bits(self.fps.load(Ordering::Relaxed)),
        }
    }
}

impl PixelBufferProvider for FrameSink {
    fn copy_pixel_buffer(&self) -> Option<Arc<FrameBuffer>> {
        let (frame, unread) = {
            let slot = self.pending.lock();
            (slot.clone(), self.unread.swap(false, Ordering::AcqRel))
        };
        if frame.is_some() && unread {
            self.copies.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }
}

impl TextureSource for FrameSink {
    fn register_texture(self: Arc<Self>, registry: &dyn TextureRegistry) -> Option<TextureId> {
        if let Some(id) = self.texture_id.get() {
            return Some(*id);
        }
        let provider: Arc<dyn PixelBufferProvider> = self.clone();
        let id = registry.register_texture(provider)?;
        // First registration wins; a lost race keeps the stored id
        if self.texture_id.set(id).is_err() {
            registry.unregister_texture(id);
        }
        self.texture_id.get().copied()
    }

    fn capture_sample(&self, frame: FrameBuffer) {
        if self.is_detached() {
            return;
        }
        if !frame.is_complete() {
            trace!(uuid = %self.uuid, "Discarding incomplete frame");
            return;
        }

        let now = Instant::now();
        let samples = self.samples.fetch_add(1, Ordering::Relaxed) + 1;
        let Some(mut slot) = self.pending.try_lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(uuid = %self.uuid, "Slot busy, dropping frame");
            return;
        };
        if self.is_detached() {
            return;
        }
        let previous = slot.replace(Arc::new(frame));
        let replaced_unread = self.unread.swap(true, Ordering::AcqRel) && previous.is_some();
        drop(slot);
        drop(previous);
        if replaced_unread {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(mut counter) = self.fps_counter.try_lock() {
            counter.tick(now);
            self.fps.store(counter.fps.to_bits(), Ordering::Relaxed);
        }
        if samples % timing::FRAME_LOG_INTERVAL == 0 {
            trace!(uuid = %self.uuid, samples, "Frames delivered");
        }

        if let (Some(id), Some(registry)) = (self.texture_id.get(), self.registry.upgrade()) {
            registry.texture_frame_available(*id);
        }
    }

    fn texture_id(&self) -> Option<TextureId> {
        self.texture_id.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::PixelFormat;
    use std::time::Duration;

    fn frame(tag: u8) -> FrameBuffer {
        FrameBuffer::new(1, 1, PixelFormat::RGBA, vec![tag; 4])
    }

    #[test]
    fn test_latest_wins() {
        let sink = FrameSink::new("src1");
        sink.capture_sample(frame(1));
        sink.capture_sample(frame(2));

        let read = sink.copy_pixel_buffer().unwrap();
        assert_eq!(read.data[0], 2);

        let stats = sink.stats();
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.copies, 1);
    }

    #[test]
    fn test_copy_is_not_consuming() {
        let sink = FrameSink::new("src1");
        sink.capture_sample(frame(7));

        assert_eq!(sink.copy_pixel_buffer().unwrap().data[0], 7);
        assert_eq!(sink.copy_pixel_buffer().unwrap().data[0], 7);
        // Re-reading the same frame is not a new copy
        assert_eq!(sink.stats().copies, 1);

        // A frame that was read is not counted as dropped when replaced
        sink.capture_sample(frame(8));
        assert_eq!(sink.stats().dropped, 0);
    }

    #[test]
    fn test_take_frame_empties_slot() {
        let sink = FrameSink::new("src1");
        sink.capture_sample(frame(3));

        assert!(sink.take_frame().is_some());
        assert!(sink.take_frame().is_none());
        assert!(sink.copy_pixel_buffer().is_none());
    }

    #[test]
    fn test_detached_sink_ignores_frames() {
        let sink = FrameSink::new("src1");
        sink.capture_sample(frame(1));
        sink.detach();
        sink.capture_sample(frame(2));

        assert!(sink.copy_pixel_buffer().is_none());
        assert_eq!(sink.stats().samples, 1);
    }

    #[test]
    fn test_incomplete_frame_discarded() {
        let sink = FrameSink::new("src1");
        sink.capture_sample(FrameBuffer::new(4, 4, PixelFormat::RGBA, vec![0u8; 8]));
        assert!(sink.copy_pixel_buffer().is_none());
    }

    #[test]
    fn test_fps_counter_window() {
        let mut counter = FpsCounter::new();
        let start = counter.window_start;
        for i in 0..30 {
            counter.tick(start + Duration::from_millis(i * 10));
        }
        assert_eq!(counter.fps, 0.0);

        counter.tick(start + Duration::from_secs(1));
        assert!((counter.fps - 31.0).abs() < 0.01);
        assert_eq!(counter.frames_in_window, 0);
    }

    #[test]
    fn test_concurrent_delivery_and_reads() {
        let sink = Arc::new(FrameSink::new("src1"));
        let producer = {
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || {
                for i in 0..500u32 {
                    sink.capture_sample(frame((i % 250) as u8));
                }
            })
        };
        for _ in 0..500 {
            if let Some(f) = sink.copy_pixel_buffer() {
                assert_eq!(f.data.len(), 4);
            }
        }
        producer.join().unwrap();

        let stats = sink.stats();
        assert_eq!(stats.samples, 500);
        assert!(stats.dropped + stats.copies <= 500);

        // Uncontended, the newest frame always lands
        sink.capture_sample(frame(251));
        assert_eq!(sink.copy_pixel_buffer().unwrap().data[0], 251);
    }

    #[test]
    fn test_busy_slot_drops_instead_of_waiting() {
        let sink = FrameSink::new("src1");
        sink.capture_sample(frame(1));
        {
            let _reader = sink.pending.lock();
            // Would deadlock on this thread if the producer waited for the slot
            sink.capture_sample(frame(2));
        }

        assert_eq!(sink.copy_pixel_buffer().unwrap().data[0], 1);
        let stats = sink.stats();
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.copies, 1);
    }

    #[test]
    fn test_read_flag_tracks_slot() {
        let sink = FrameSink::new("src1");
        sink.capture_sample(frame(1));
        assert_eq!(sink.copy_pixel_buffer().unwrap().data[0], 1);

        // The replaced frame was read, the new one is unread
        sink.capture_sample(frame(2));
        assert_eq!(sink.stats().dropped, 0);
        assert!(sink.unread.load(Ordering::Acquire));

        assert_eq!(sink.take_frame().unwrap().data[0], 2);
        assert!(!sink.unread.load(Ordering::Acquire));
        assert_eq!(sink.stats().copies, 2);
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Frame capture pipeline
//!
//! Moves decoded frames from engine producer threads into texture slots read
//! by a renderer.
//!
//! ```text
//! producer thread ──deliver──► FrameSink (latest-wins slot) ◄──copy── render thread
//!                                   │
//!                                   └─ texture_frame_available(id) ─► TextureRegistry
//! ```
//!
//! Sinks are keyed by the source (or video mix) uuid. Delivery looks the sink
//! up on every frame, so a producer can start before the UI registers and keeps
//! running after it unregisters.

mod sink;
mod texture;
mod types;

pub use sink::FrameSink;
pub use texture::{MemoryTextureRegistry, PixelBufferProvider, TextureRegistry, TextureSource};
pub use types::{CaptureStats, FrameBuffer, PixelFormat, TextureId};

use crate::engine::FrameCallback;
use crate::errors::{BridgeError, BridgeResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Registered frame sinks, keyed by uuid
pub struct FrameCapture {
    textures: Arc<dyn TextureRegistry>,
    sinks: RwLock<HashMap<String, Arc<FrameSink>>>,
}

impl FrameCapture {
    pub fn new(textures: Arc<dyn TextureRegistry>) -> Arc<Self> {
        Arc::new(Self {
            textures,
            sinks: RwLock::new(HashMap::new()),
        })
    }

    /// Attach a sink to `uuid` and register its texture
    ///
    /// Registering an already registered uuid returns the existing texture id.
    pub fn register(&self, uuid: &str) -> BridgeResult<TextureId> {
        if let Some(id) = self.texture_id(uuid) {
            return Ok(id);
        }

        let sink = FrameSink::registered(uuid, &self.textures)
            .ok_or_else(|| BridgeError::engine_fault(format!("texture refused for {}", uuid)))?;
        let id = sink
            .texture_id()
            .ok_or_else(|| BridgeError::engine_fault(format!("no texture id for {}", uuid)))?;

        let mut sinks = self.sinks.write();
        if let Some(existing) = sinks.get(uuid).and_then(|s| s.texture_id()) {
            // Lost a registration race
            drop(sinks);
            sink.detach();
            self.textures.unregister_texture(id);
            return Ok(existing);
        }
        sinks.insert(uuid.to_string(), sink);
        info!(uuid = %uuid, texture_id = %id, "Frame capture registered");
        Ok(id)
    }

    /// Detach and forget the sink of `uuid`
    ///
    /// Safe while a delivery is in flight: the producer keeps its own `Arc` to
    /// the sink and the detached flag discards the frame.
    pub fn unregister(&self, uuid: &str) -> BridgeResult<()> {
        let sink = self
            .sinks
            .write()
            .remove(uuid)
            .ok_or_else(|| BridgeError::not_found(format!("frame capture {}", uuid)))?;
        sink.detach();
        if let Some(id) = sink.texture_id() {
            self.textures.unregister_texture(id);
        }
        info!(uuid = %uuid, "Frame capture unregistered");
        Ok(())
    }

    /// Unregister by texture id
    pub fn dispose_texture(&self, texture_id: TextureId) -> BridgeResult<()> {
        let uuid = self
            .sinks
            .read()
            .iter()
            .find(|(_, sink)| sink.texture_id() == Some(texture_id))
            .map(|(uuid, _)| uuid.clone())
            .ok_or_else(|| BridgeError::not_found(format!("texture {}", texture_id)))?;
        self.unregister(&uuid)
    }

    /// Hand a frame to the sink of `uuid` (producer thread)
    ///
    /// A missing sink is not an error: the frame is dropped. So is a frame
    /// that arrives while a sink is being registered or unregistered.
    pub fn deliver(&self, uuid: &str, frame: FrameBuffer) {
        let Some(sinks) = self.sinks.try_read() else {
            trace!(uuid = %uuid, "Sink map busy, frame dropped");
            return;
        };
        let sink = sinks.get(uuid).cloned();
        drop(sinks);
        match sink {
            Some(sink) => sink.capture_sample(frame),
            None => trace!(uuid = %uuid, "No frame sink, frame dropped"),
        }
    }

    /// Engine frame output that delivers into the sink of `uuid`
    pub fn frame_callback(self: &Arc<Self>, uuid: &str) -> FrameCallback {
        let capture = Arc::downgrade(self);
        let uuid = uuid.to_string();
        Arc::new(move |frame| {
            if let Some(capture) = capture.upgrade() {
                capture.deliver(&uuid, frame);
            }
        })
    }

    pub fn is_registered(&self, uuid: &str) -> bool {
        self.sinks.read().contains_key(uuid)
    }

    pub fn texture_id(&self, uuid: &str) -> Option<TextureId> {
        self.sinks.read().get(uuid).and_then(|sink| sink.texture_id())
    }

    /// Latest frame of `uuid` without consuming it
    pub fn copy_frame(&self, uuid: &str) -> Option<Arc<FrameBuffer>> {
        let sink = self.sinks.read().get(uuid).cloned()?;
        sink.copy_pixel_buffer()
    }

    /// Latest frame of `uuid`, leaving the slot empty
    pub fn take_frame(&self, uuid: &str) -> Option<Arc<FrameBuffer>> {
        let sink = self.sinks.read().get(uuid).cloned()?;
        sink.take_frame()
    }

    pub fn stats(&self, uuid: &str) -> Option<CaptureStats> {
        self.sinks.read().get(uuid).map(|sink| sink.stats())
    }

    /// Unregister every sink
    pub fn clear(&self) {
        let sinks: Vec<_> = self.sinks.write().drain().collect();
        for (uuid, sink) in sinks {
            sink.detach();
            if let Some(id) = sink.texture_id() {
                self.textures.unregister_texture(id);
            }
            debug!(uuid = %uuid, "Frame capture cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<MemoryTextureRegistry>, Arc<FrameCapture>) {
        let textures = Arc::new(MemoryTextureRegistry::new());
        let capture = FrameCapture::new(textures.clone());
        (textures, capture)
    }

    fn frame(tag: u8) -> FrameBuffer {
        FrameBuffer::new(2, 1, PixelFormat::BGRA, vec![tag; 8])
    }

    #[test]
    fn test_register_is_stable() {
        let (textures, capture) = setup();
        let id = capture.register("src1").unwrap();
        assert_eq!(capture.register("src1").unwrap(), id);
        assert_eq!(textures.len(), 1);
    }

    #[test]
    fn test_deliver_without_sink_is_noop() {
        let (_, capture) = setup();
        capture.deliver("nobody", frame(1));
        assert!(capture.copy_frame("nobody").is_none());
    }

    #[test]
    fn test_renderer_sees_latest_frame() {
        let (textures, capture) = setup();
        let id = capture.register("src1").unwrap();
        let output = capture.frame_callback("src1");

        output(frame(1));
        output(frame(2));

        assert_eq!(textures.frame(id).unwrap().data[0], 2);
        assert_eq!(textures.frames_available(id), 2);
        assert_eq!(capture.stats("src1").unwrap().dropped, 1);
    }

    #[test]
    fn test_deliver_skips_busy_sink_map() {
        let (_, capture) = setup();
        capture.register("src1").unwrap();
        {
            let _registering = capture.sinks.write();
            capture.deliver("src1", frame(1));
        }
        assert!(capture.copy_frame("src1").is_none());

        capture.deliver("src1", frame(2));
        assert_eq!(capture.copy_frame("src1").unwrap().data[0], 2);
    }

    #[test]
    fn test_unregister_releases_texture() {
        let (textures, capture) = setup();
        let id = capture.register("src1").unwrap();
        capture.unregister("src1").unwrap();

        assert!(!textures.contains(id));
        assert!(matches!(
            capture.unregister("src1"),
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_dispose_texture_by_id() {
        let (_, capture) = setup();
        let id = capture.register("src1").unwrap();
        capture.dispose_texture(id).unwrap();
        assert!(!capture.is_registered("src1"));
        assert!(capture.dispose_texture(id).is_err());
    }

    #[test]
    fn test_refused_texture_is_an_error() {
        let (textures, capture) = setup();
        textures.set_accepting(false);
        assert!(matches!(
            capture.register("src1"),
            Err(BridgeError::EngineFault(_))
        ));
        assert!(!capture.is_registered("src1"));
    }

    #[test]
    fn test_unregister_during_delivery() {
        let (_, capture) = setup();
        capture.register("src1").unwrap();
        let output = capture.frame_callback("src1");

        let producer = std::thread::spawn(move || {
            for i in 0..1000u32 {
                output(frame(i as u8));
            }
        });
        capture.unregister("src1").unwrap();
        producer.join().unwrap();

        assert!(capture.copy_frame("src1").is_none());
    }
}

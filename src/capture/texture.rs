// SPDX-License-Identifier: GPL-3.0-only

//! Texture registry seam
//!
//! The UI side owns GPU textures. It hands out a texture identifier for every
//! provider it accepts and pulls pixel buffers from the provider when it is
//! told a new frame is available.

use super::types::{FrameBuffer, TextureId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use tracing::{debug, trace};

/// Something the texture registry can pull the latest pixel buffer from
pub trait PixelBufferProvider: Send + Sync {
    /// Latest frame, or `None` if nothing has been delivered yet
    fn copy_pixel_buffer(&self) -> Option<Arc<FrameBuffer>>;
}

/// UI-side texture registry
pub trait TextureRegistry: Send + Sync {
    /// Register a provider, returning its texture id (`None` if refused)
    fn register_texture(&self, provider: Arc<dyn PixelBufferProvider>) -> Option<TextureId>;

    /// Notify the renderer that `id` has a new frame
    fn texture_frame_available(&self, id: TextureId);

    /// Forget a texture and drop its provider
    fn unregister_texture(&self, id: TextureId);
}

/// Producer/consumer object ferrying frames of one source to one texture
pub trait TextureSource: PixelBufferProvider {
    /// Register with `registry`; repeated calls return the same id
    fn register_texture(self: Arc<Self>, registry: &dyn TextureRegistry) -> Option<TextureId>;

    /// Hand over a decoded frame (producer thread)
    fn capture_sample(&self, frame: FrameBuffer);

    fn texture_id(&self) -> Option<TextureId>;
}

struct TextureEntry {
    provider: Arc<dyn PixelBufferProvider>,
    frames_available: AtomicU64,
}

/// In-process texture registry
///
/// Stands in for the UI registry in the CLI and in tests. Renderers pull
/// frames with [`MemoryTextureRegistry::frame`].
pub struct MemoryTextureRegistry {
    textures: RwLock<HashMap<TextureId, TextureEntry>>,
    next_id: AtomicI64,
    accepting: AtomicBool,
}

impl MemoryTextureRegistry {
    pub fn new() -> Self {
        Self {
            textures: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            accepting: AtomicBool::new(true),
        }
    }

    /// Refuse (or accept again) new registrations
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Pull the latest frame of a texture, as a renderer would
    pub fn frame(&self, id: TextureId) -> Option<Arc<FrameBuffer>> {
        let provider = self.textures.read().get(&id).map(|e| Arc::clone(&e.provider))?;
        provider.copy_pixel_buffer()
    }

    /// Number of frame-available notifications received for a texture
    pub fn frames_available(&self, id: TextureId) -> u64 {
        self.textures
            .read()
            .get(&id)
            .map(|e| e.frames_available.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn contains(&self, id: TextureId) -> bool {
        self.textures.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.textures.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTextureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureRegistry for MemoryTextureRegistry {
    fn register_texture(&self, provider: Arc<dyn PixelBufferProvider>) -> Option<TextureId> {
        if !self.accepting.load(Ordering::SeqCst) {
            debug!("Texture registration refused");
            return None;
        }
        let id = TextureId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.textures.write().insert(
            id,
            TextureEntry {
                provider,
                frames_available: AtomicU64::new(0),
            },
        );
        debug!(texture_id = %id, "Texture registered");
        Some(id)
    }

    /// Called on producer threads; never waits on a registration in progress
    fn texture_frame_available(&self, id: TextureId) {
        let Some(textures) = self.textures.try_read() else {
            trace!(texture_id = %id, "Registry busy, skipping notification");
            return;
        };
        match textures.get(&id) {
            Some(entry) => {
                entry.frames_available.fetch_add(1, Ordering::Relaxed);
            }
            None => trace!(texture_id = %id, "Frame available for unknown texture"),
        }
    }

    fn unregister_texture(&self, id: TextureId) {
        if self.textures.write().remove(&id).is_some() {
            debug!(texture_id = %id, "Texture unregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::PixelFormat;

    struct Fixed(Arc<FrameBuffer>);

    impl PixelBufferProvider for Fixed {
        fn copy_pixel_buffer(&self) -> Option<Arc<FrameBuffer>> {
            Some(Arc::clone(&self.0))
        }
    }

    #[test]
    fn test_ids_are_positive_and_distinct() {
        let registry = MemoryTextureRegistry::new();
        let frame = Arc::new(FrameBuffer::new(1, 1, PixelFormat::BGRA, vec![0u8; 4]));
        let a = registry.register_texture(Arc::new(Fixed(frame.clone()))).unwrap();
        let b = registry.register_texture(Arc::new(Fixed(frame))).unwrap();

        assert!(a.0 > 0);
        assert_ne!(a, b);
        assert!(registry.frame(a).is_some());

        registry.unregister_texture(a);
        assert!(!registry.contains(a));
        assert!(registry.frame(a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_notification_skipped_while_registry_busy() {
        let registry = MemoryTextureRegistry::new();
        let frame = Arc::new(FrameBuffer::new(1, 1, PixelFormat::BGRA, vec![0u8; 4]));
        let id = registry.register_texture(Arc::new(Fixed(frame))).unwrap();

        registry.texture_frame_available(id);
        {
            let _busy = registry.textures.write();
            registry.texture_frame_available(id);
        }
        registry.texture_frame_available(id);
        assert_eq!(registry.frames_available(id), 2);
    }

    #[test]
    fn test_refusing_registry() {
        let registry = MemoryTextureRegistry::new();
        registry.set_accepting(false);
        let frame = Arc::new(FrameBuffer::new(1, 1, PixelFormat::BGRA, vec![0u8; 4]));
        assert!(registry.register_texture(Arc::new(Fixed(frame))).is_none());
        assert!(registry.is_empty());
    }
}

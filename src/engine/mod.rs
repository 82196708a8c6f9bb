// SPDX-License-Identifier: GPL-3.0-only

//! Native engine abstraction
//!
//! The compositing engine is an explicit context object handed to every
//! component constructor. Nothing in the bridge reaches the engine through
//! process-wide state, so several isolated engines can coexist (tests run one
//! per case).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────┐
//! │   Bridge (command surface)  │
//! └──────────────┬──────────────┘
//!                │  EngineContext = Arc<dyn Engine>
//!                ▼
//! ┌─────────────────────────────┐
//! │        Engine trait         │  ← sources, scenes, media, output, meters
//! └──────────────┬──────────────┘
//!                │
//!                ▼
//!        ┌────────────────┐
//!        │ SoftwareEngine │  ← in-process implementation
//!        └────────────────┘
//! ```
//!
//! Engines call back into the bridge from their own threads through
//! [`FrameCallback`], [`VolumeCallback`] and [`OutputListener`]. Callbacks
//! never receive engine locks, and engines must not hold their own state lock
//! while invoking them.

pub mod frame_loop;
pub mod software;

pub use frame_loop::CaptureLoopController;
pub use software::SoftwareEngine;

use crate::capture::FrameBuffer;
use crate::config::VideoSettings;
use crate::constants::input_types;
use crate::errors::BridgeResult;
use crate::scene::SceneItemInfo;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared engine context
pub type EngineContext = Arc<dyn Engine>;

/// Called on a producer thread for every decoded frame
pub type FrameCallback = Arc<dyn Fn(FrameBuffer) + Send + Sync>;

/// Called on an engine thread with periodic level samples
pub type VolumeCallback = Arc<dyn Fn(VolumeLevels) + Send + Sync>;

/// Receives asynchronous output-mix transitions
pub type OutputListener = Arc<dyn Fn(OutputEvent) + Send + Sync>;

/// Opaque engine object handle
///
/// Handles are engine-allocated logical indices, never native addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NativeHandle(pub u64);

impl std::fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a source is built from
///
/// One tagged parameter replaces per-kind create calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Local media file with a playback clock
    Media {
        local_file: PathBuf,
        #[serde(default)]
        looping: bool,
    },
    /// Camera or capture card
    VideoCapture {
        device_name: String,
        device_uid: String,
    },
    /// Microphone or line input
    AudioCapture { device_uid: String },
    /// Still image file
    Image { file: PathBuf },
    /// Any other engine input type, addressed by its type id
    Generic { source_id: String },
}

impl SourceKind {
    /// Engine input type id for this kind
    pub fn input_type(&self) -> &str {
        match self {
            SourceKind::Media { .. } => input_types::MEDIA,
            SourceKind::VideoCapture { .. } => input_types::VIDEO_CAPTURE,
            SourceKind::AudioCapture { .. } => input_types::AUDIO_CAPTURE,
            SourceKind::Image { .. } => input_types::IMAGE,
            SourceKind::Generic { source_id } => source_id,
        }
    }

    /// Whether the playback controller may drive this source
    pub fn is_media(&self) -> bool {
        matches!(self, SourceKind::Media { .. })
    }

    /// Whether the source produces video frames
    pub fn has_video(&self) -> bool {
        !matches!(self, SourceKind::AudioCapture { .. })
    }

    /// Whether the source carries audio a volume meter can observe
    pub fn has_audio(&self) -> bool {
        matches!(
            self,
            SourceKind::Media { .. } | SourceKind::AudioCapture { .. }
        )
    }

    /// Capture device this source holds open, if any
    pub fn device_uid(&self) -> Option<&str> {
        match self {
            SourceKind::VideoCapture { device_uid, .. } | SourceKind::AudioCapture { device_uid } => {
                Some(device_uid)
            }
            _ => None,
        }
    }
}

/// `{id, display_name}` record returned by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub id: String,
    pub name: String,
}

impl InputDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One volume-meter sample, one value per channel, in dBFS
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VolumeLevels {
    pub magnitude: Vec<f32>,
    pub peak: Vec<f32>,
    pub input_peak: Vec<f32>,
}

impl VolumeLevels {
    /// Number of channels in the sample
    pub fn channels(&self) -> usize {
        self.magnitude.len()
    }
}

/// Playback status as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeMediaStatus {
    Stopped,
    Playing,
    Paused,
    /// Reached the end without looping
    Ended,
    /// Decoder or device failure
    Fault(String),
}

/// Asynchronous output-mix transition reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Output reached the running state
    Started,
    /// Output finished stopping
    Stopped,
    /// Output failed to start or faulted while running
    Failed(String),
}

/// Compositing engine interface
///
/// Synchronous calls may block briefly (device open, file decode) but never
/// indefinitely. Output start/stop complete asynchronously through the
/// listener installed with [`Engine::set_output_listener`].
pub trait Engine: Send + Sync {
    // ===== Lifecycle =====

    /// Engine name for logging
    fn name(&self) -> &str;

    /// Bootstrap the engine. Failure is fatal to every later call.
    fn startup(&self, video: &VideoSettings) -> BridgeResult<()>;

    /// Apply new video settings. Fails while video mixes are attached.
    fn reset_video(&self, video: &VideoSettings) -> BridgeResult<()>;

    // ===== Sources =====

    /// Instantiate a source
    ///
    /// # Returns
    /// * `Err(BridgeError::DeviceUnavailable)` - device missing or busy, file unreadable
    /// * `Err(BridgeError::Unsupported)` - kind not implemented
    fn create_source(&self, kind: &SourceKind, name: &str) -> BridgeResult<NativeHandle>;

    /// Destroy a source. Unknown handles are ignored.
    fn release_source(&self, source: NativeHandle);

    /// Attach (or detach with `None`) the frame output of a source
    ///
    /// Frames are delivered on a producer thread owned by the engine.
    fn set_frame_output(&self, source: NativeHandle, output: Option<FrameCallback>)
    -> BridgeResult<()>;

    // ===== Scenes =====

    fn create_scene(&self, name: &str) -> BridgeResult<NativeHandle>;

    /// Destroy a scene and every item it still holds
    fn release_scene(&self, scene: NativeHandle);

    /// Place a source on top of a scene, returning the item handle
    fn scene_add(&self, scene: NativeHandle, source: NativeHandle) -> BridgeResult<NativeHandle>;

    fn scene_item_remove(&self, item: NativeHandle);

    /// Push a transform/visibility record (including order) to the engine
    fn scene_item_apply(&self, item: NativeHandle, info: &SceneItemInfo) -> BridgeResult<()>;

    // ===== Media =====

    fn media_duration(&self, source: NativeHandle) -> BridgeResult<u64>;

    fn media_time(&self, source: NativeHandle) -> BridgeResult<u64>;

    /// Start playback from `from_ms`
    fn media_play(&self, source: NativeHandle, from_ms: u64) -> BridgeResult<()>;

    fn media_pause(&self, source: NativeHandle) -> BridgeResult<()>;

    fn media_resume(&self, source: NativeHandle) -> BridgeResult<()>;

    fn media_seek(&self, source: NativeHandle, ms: u64) -> BridgeResult<()>;

    /// Stop playback and rewind to zero
    fn media_stop(&self, source: NativeHandle) -> BridgeResult<()>;

    fn media_status(&self, source: NativeHandle) -> BridgeResult<NativeMediaStatus>;

    // ===== Output mix =====

    fn set_output_listener(&self, listener: OutputListener);

    /// Begin starting the output. Completion arrives as [`OutputEvent`].
    fn output_start(&self) -> BridgeResult<()>;

    /// Begin stopping the output. Completion arrives as [`OutputEvent`].
    fn output_stop(&self) -> BridgeResult<()>;

    // ===== Video mixes =====

    /// Attach a render mix whose composed frames go to `output`
    fn add_video_mix(&self, output: FrameCallback) -> BridgeResult<NativeHandle>;

    fn remove_video_mix(&self, mix: NativeHandle);

    // ===== Volume meters =====

    /// Attach a level meter to a source
    ///
    /// # Returns
    /// * `Ok((meter, channels))` - meter handle and number of channels sampled
    fn add_volmeter(
        &self,
        source: NativeHandle,
        callback: VolumeCallback,
    ) -> BridgeResult<(NativeHandle, usize)>;

    fn remove_volmeter(&self, meter: NativeHandle);

    // ===== Enumeration =====

    fn input_types(&self) -> Vec<InputDescriptor>;

    fn inputs_from_type(&self, type_id: &str) -> Vec<InputDescriptor>;

    fn audio_inputs(&self) -> Vec<InputDescriptor> {
        self.inputs_from_type(input_types::AUDIO_CAPTURE)
    }

    fn video_inputs(&self) -> Vec<InputDescriptor> {
        self.inputs_from_type(input_types::VIDEO_CAPTURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_json_is_tagged() {
        let kind: SourceKind =
            serde_json::from_str(r#"{ "kind": "media", "local_file": "/tmp/a.mp4" }"#).unwrap();
        assert_eq!(
            kind,
            SourceKind::Media {
                local_file: PathBuf::from("/tmp/a.mp4"),
                looping: false
            }
        );
        assert_eq!(kind.input_type(), input_types::MEDIA);
        assert!(kind.is_media());
    }

    #[test]
    fn test_device_uid_only_for_captures() {
        let camera = SourceKind::VideoCapture {
            device_name: "Cam".into(),
            device_uid: "uid-1".into(),
        };
        assert_eq!(camera.device_uid(), Some("uid-1"));
        assert!(camera.has_video());
        assert!(!camera.has_audio());

        let image = SourceKind::Image {
            file: PathBuf::from("a.png"),
        };
        assert_eq!(image.device_uid(), None);
    }
}

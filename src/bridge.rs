// SPDX-License-Identifier: GPL-3.0-only

//! Flat command surface
//!
//! [`Bridge`] owns one instance of every controller, all sharing a single
//! [`EngineContext`]. Its methods are the boundary: every error is logged and
//! reduced to `false` or a sentinel value, nothing propagates further.
//!
//! [`Bridge::dispatch`] exposes the same surface as a method-channel entry
//! point taking camelCase method names and JSON arguments.

use crate::capture::{CaptureStats, FrameBuffer, FrameCapture, TextureId, TextureRegistry};
use crate::config::{Config, VideoSettings};
use crate::constants::{sentinel, timing};
use crate::engine::{EngineContext, InputDescriptor, NativeHandle, SourceKind};
use crate::errors::{BridgeError, BridgeResult};
use crate::inputs::InputEnumerator;
use crate::media::MediaController;
use crate::output::{OutputController, OutputState};
use crate::registry::{HandleRegistry, RegisteredObject};
use crate::scene::{SceneGraph, SceneItemInfo, SceneItemUpdate};
use crate::video::VideoMixer;
use crate::volume::{VolumeBridge, VolumeEvent};
use futures::channel::mpsc::UnboundedReceiver;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

pub struct Bridge {
    engine: EngineContext,
    started: AtomicBool,
    registry: Arc<HandleRegistry>,
    capture: Arc<FrameCapture>,
    scenes: SceneGraph,
    media: MediaController,
    output: Arc<OutputController>,
    volume: VolumeBridge,
    inputs: InputEnumerator,
    video: VideoMixer,
}

impl Bridge {
    /// Start the engine and build the controllers around it
    ///
    /// Fails with [`BridgeError::EngineNotStarted`] when the engine cannot
    /// start; no other command can be issued in that case.
    pub fn startup(
        engine: EngineContext,
        textures: Arc<dyn TextureRegistry>,
        config: &Config,
    ) -> BridgeResult<Self> {
        info!(engine = engine.name(), "Starting engine");
        if let Err(e) = engine.startup(&config.video) {
            error!(engine = engine.name(), error = %e, "Engine startup failed");
            return Err(BridgeError::EngineNotStarted);
        }

        let registry = Arc::new(HandleRegistry::new(engine.clone()));
        let capture = FrameCapture::new(textures);
        let output = Arc::new(OutputController::new(engine.clone()));
        let bridge = Self {
            scenes: SceneGraph::new(engine.clone(), registry.clone()),
            media: MediaController::new(engine.clone(), registry.clone()),
            volume: VolumeBridge::new(engine.clone(), registry.clone()),
            inputs: InputEnumerator::new(engine.clone()),
            video: VideoMixer::new(
                engine.clone(),
                registry.clone(),
                capture.clone(),
                output.clone(),
                config.video,
            ),
            engine,
            started: AtomicBool::new(true),
            registry,
            capture,
            output,
        };
        info!(
            engine = bridge.engine.name(),
            width = config.video.output_width,
            height = config.video.output_height,
            "Engine started"
        );
        Ok(bridge)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Stop the output and release every object
    ///
    /// Every command fails afterwards.
    pub fn shutdown(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        match self.output.force_stop() {
            Ok(()) => {
                let state = self.output.wait_settled(timing::SHUTDOWN_OUTPUT_WAIT);
                if state != OutputState::Stopped {
                    warn!(?state, "Output did not stop during shutdown");
                }
            }
            Err(e) => warn!(error = %e, "Output stop failed during shutdown"),
        }

        let entries = self.registry.entries();
        // Mixes and scenes reference sources, so they go first
        for entry in entries.iter().filter(|e| !matches!(e.object, RegisteredObject::Source { .. })) {
            let result = match entry.object {
                RegisteredObject::VideoMix => self.video.remove_video_mix(&entry.uuid),
                _ => self.scenes.release_scene(&entry.uuid),
            };
            if let Err(e) = result {
                warn!(uuid = %entry.uuid, error = %e, "Release failed during shutdown");
            }
        }
        for entry in entries.iter().filter(|e| matches!(e.object, RegisteredObject::Source { .. })) {
            if let Err(e) = self.release(&entry.uuid) {
                warn!(uuid = %entry.uuid, error = %e, "Release failed during shutdown");
            }
        }
        self.capture.clear();
        info!(released = entries.len(), "Bridge shut down");
    }

    /// Run a command, logging success at info
    fn command<T>(&self, command: &'static str, op: impl FnOnce() -> BridgeResult<T>) -> Option<T> {
        self.run(command, true, op)
    }

    /// Run a query, logging success at debug
    fn query<T>(&self, command: &'static str, op: impl FnOnce() -> BridgeResult<T>) -> Option<T> {
        self.run(command, false, op)
    }

    fn run<T>(
        &self,
        command: &'static str,
        changes_state: bool,
        op: impl FnOnce() -> BridgeResult<T>,
    ) -> Option<T> {
        let result = if self.is_started() {
            op()
        } else {
            Err(BridgeError::EngineNotStarted)
        };
        match result {
            Ok(value) => {
                if changes_state {
                    info!(command, "Command applied");
                } else {
                    debug!(command, "Query answered");
                }
                Some(value)
            }
            Err(e) => {
                warn!(command, kind = e.kind(), error = %e, "Command failed");
                None
            }
        }
    }

    // ===== Sources and scenes =====

    /// Create a source; with `frame_source` set its frames go to the frame
    /// sink registered under `uuid`
    pub fn create_source(&self, uuid: &str, kind: &SourceKind, name: &str, frame_source: bool) -> bool {
        debug!(uuid = %uuid, kind = kind.input_type(), source_name = name, frame_source, "create_source");
        self.command("create_source", || {
            let output = frame_source.then(|| self.capture.frame_callback(uuid));
            self.registry.create_source(uuid, kind, name, output)
        })
        .is_some()
    }

    /// Release a source, its scene items, its volume meters and its frame sink
    pub fn release_source(&self, uuid: &str) -> bool {
        debug!(uuid = %uuid, "release_source");
        self.command("release_source", || self.release(uuid)).is_some()
    }

    /// Start delivering frames of an existing source to the frame sink
    /// registered under its uuid
    pub fn add_source_frame_callback(&self, uuid: &str) -> bool {
        debug!(uuid = %uuid, "add_source_frame_callback");
        self.command("add_source_frame_callback", || {
            self.registry
                .set_frame_output(uuid, Some(self.capture.frame_callback(uuid)))
        })
        .is_some()
    }

    pub fn remove_source_frame_callback(&self, uuid: &str) -> bool {
        debug!(uuid = %uuid, "remove_source_frame_callback");
        self.command("remove_source_frame_callback", || {
            self.registry.set_frame_output(uuid, None)
        })
        .is_some()
    }

    fn release(&self, uuid: &str) -> BridgeResult<()> {
        self.registry.release_source(uuid, |entry| {
            let items = self.scenes.remove_source(&entry.uuid);
            let meters = self.volume.remove_source(&entry.uuid);
            self.media.forget(&entry.uuid);
            match self.capture.unregister(&entry.uuid) {
                Ok(()) | Err(BridgeError::NotFound(_)) => {}
                Err(e) => {
                    warn!(uuid = %entry.uuid, error = %e, "Failed to unregister frame capture")
                }
            }
            debug!(uuid = %entry.uuid, items, meters, "Detached source");
        })?;
        Ok(())
    }

    pub fn create_scene(&self, uuid: &str, name: &str) -> bool {
        debug!(uuid = %uuid, scene_name = name, "create_scene");
        self.command("create_scene", || self.scenes.create_scene(uuid, name))
            .is_some()
    }

    pub fn release_scene(&self, uuid: &str) -> bool {
        debug!(uuid = %uuid, "release_scene");
        self.command("release_scene", || self.scenes.release_scene(uuid))
            .is_some()
    }

    /// Place a source in a scene, returning the new item id or
    /// [`sentinel::INVALID_ITEM_ID`]
    pub fn add_source(&self, scene_uuid: &str, source_uuid: &str) -> i64 {
        debug!(scene = %scene_uuid, source = %source_uuid, "add_source");
        self.command("add_source", || self.scenes.add_source(scene_uuid, source_uuid))
            .unwrap_or(sentinel::INVALID_ITEM_ID)
    }

    pub fn remove_scene_item(&self, scene_uuid: &str, item_id: i64) -> bool {
        debug!(scene = %scene_uuid, item_id, "remove_scene_item");
        self.command("remove_scene_item", || self.scenes.remove_item(scene_uuid, item_id))
            .is_some()
    }

    pub fn get_scene_item_info(&self, scene_uuid: &str, item_id: i64) -> Option<SceneItemInfo> {
        debug!(scene = %scene_uuid, item_id, "get_scene_item_info");
        self.query("get_scene_item_info", || self.scenes.get_item_info(scene_uuid, item_id))
    }

    /// Merge `update` into the item's info
    pub fn set_scene_item_info(&self, scene_uuid: &str, item_id: i64, update: &SceneItemUpdate) -> bool {
        debug!(scene = %scene_uuid, item_id, "set_scene_item_info");
        self.command("set_scene_item_info", || {
            self.scenes.set_item_info(scene_uuid, item_id, update)
        })
        .is_some()
    }

    // ===== Media =====

    pub fn media_play_pause(&self, uuid: &str, pause: bool) -> bool {
        debug!(uuid = %uuid, pause, "media_play_pause");
        self.command("media_play_pause", || self.media.play_pause(uuid, pause))
            .is_some()
    }

    pub fn media_stop(&self, uuid: &str) -> bool {
        debug!(uuid = %uuid, "media_stop");
        self.command("media_stop", || self.media.stop(uuid)).is_some()
    }

    pub fn media_restart(&self, uuid: &str) -> bool {
        debug!(uuid = %uuid, "media_restart");
        self.command("media_restart", || self.media.restart(uuid)).is_some()
    }

    /// Duration in milliseconds, or [`sentinel::INVALID_TIME`]
    pub fn media_get_duration(&self, uuid: &str) -> i64 {
        debug!(uuid = %uuid, "media_get_duration");
        self.query("media_get_duration", || self.media.get_duration(uuid))
            .map_or(sentinel::INVALID_TIME, clamp_ms)
    }

    /// Position in milliseconds, or [`sentinel::INVALID_TIME`]
    pub fn media_get_time(&self, uuid: &str) -> i64 {
        debug!(uuid = %uuid, "media_get_time");
        self.query("media_get_time", || self.media.get_time(uuid))
            .map_or(sentinel::INVALID_TIME, clamp_ms)
    }

    pub fn media_set_time(&self, uuid: &str, ms: i64) -> bool {
        debug!(uuid = %uuid, ms, "media_set_time");
        self.command("media_set_time", || self.media.set_time(uuid, ms))
            .is_some()
    }

    /// Media state code, or [`sentinel::UNKNOWN_STATE`]
    pub fn media_get_state(&self, uuid: &str) -> i32 {
        debug!(uuid = %uuid, "media_get_state");
        self.query("media_get_state", || self.media.get_state(uuid))
            .map_or(sentinel::UNKNOWN_STATE, |state| state.code())
    }

    // ===== Output =====

    pub fn stream_start(&self) -> bool {
        debug!("stream_start");
        self.command("stream_start", || self.output.start()).is_some()
    }

    pub fn stream_stop(&self) -> bool {
        debug!("stream_stop");
        self.command("stream_stop", || self.output.stop()).is_some()
    }

    pub fn output_state(&self) -> OutputState {
        self.output.get_state()
    }

    /// Output state code
    pub fn get_output_state(&self) -> i32 {
        self.output_state().code()
    }

    /// Access to the output controller, for waiting on transitions
    pub fn output(&self) -> &OutputController {
        &self.output
    }

    // ===== Volume meters =====

    /// Attach a volume meter, returning its token or [`sentinel::INVALID_TOKEN`]
    pub fn add_volmeter_callback(&self, source_uuid: &str) -> i64 {
        debug!(source = %source_uuid, "add_volmeter_callback");
        self.command("add_volmeter_callback", || self.volume.add_callback(source_uuid))
            .unwrap_or(sentinel::INVALID_TOKEN)
    }

    pub fn remove_volmeter_callback(&self, token: i64) -> bool {
        debug!(token, "remove_volmeter_callback");
        self.command("remove_volmeter_callback", || self.volume.remove_callback(token))
            .is_some()
    }

    /// Level samples of every volume meter
    pub fn volume_events(&self) -> UnboundedReceiver<VolumeEvent> {
        self.volume.subscribe()
    }

    // ===== Enumeration =====

    pub fn input_types(&self) -> Vec<InputDescriptor> {
        self.query("input_types", || Ok(self.inputs.input_types()))
            .unwrap_or_default()
    }

    pub fn inputs_from_type(&self, type_id: &str) -> Vec<InputDescriptor> {
        self.query("inputs_from_type", || Ok(self.inputs.inputs_from_type(type_id)))
            .unwrap_or_default()
    }

    pub fn audio_inputs(&self) -> Vec<InputDescriptor> {
        self.query("audio_inputs", || Ok(self.inputs.audio_inputs()))
            .unwrap_or_default()
    }

    pub fn video_inputs(&self) -> Vec<InputDescriptor> {
        self.query("video_inputs", || Ok(self.inputs.video_inputs()))
            .unwrap_or_default()
    }

    // ===== Frame capture =====

    /// Register a frame sink for `uuid`, returning its texture id or
    /// [`sentinel::INVALID_TEXTURE`]
    pub fn register_frame_capture(&self, uuid: &str) -> i64 {
        debug!(uuid = %uuid, "register_frame_capture");
        self.command("register_frame_capture", || self.capture.register(uuid))
            .map_or(sentinel::INVALID_TEXTURE, |id| id.0)
    }

    pub fn unregister_frame_capture(&self, uuid: &str) -> bool {
        debug!(uuid = %uuid, "unregister_frame_capture");
        self.command("unregister_frame_capture", || self.capture.unregister(uuid))
            .is_some()
    }

    pub fn dispose_texture(&self, texture_id: i64) -> bool {
        debug!(texture_id, "dispose_texture");
        self.command("dispose_texture", || {
            self.capture.dispose_texture(TextureId(texture_id))
        })
        .is_some()
    }

    /// Latest frame of `uuid` without consuming it
    pub fn copy_frame(&self, uuid: &str) -> Option<Arc<FrameBuffer>> {
        self.capture.copy_frame(uuid)
    }

    /// Latest unread frame of `uuid`
    pub fn take_frame(&self, uuid: &str) -> Option<Arc<FrameBuffer>> {
        self.capture.take_frame(uuid)
    }

    pub fn capture_stats(&self, uuid: &str) -> Option<CaptureStats> {
        self.capture.stats(uuid)
    }

    // ===== Video =====

    pub fn add_video_mix(&self, tracking_uuid: &str) -> bool {
        debug!(uuid = %tracking_uuid, "add_video_mix");
        self.command("add_video_mix", || self.video.add_video_mix(tracking_uuid))
            .is_some()
    }

    pub fn remove_video_mix(&self, tracking_uuid: &str) -> bool {
        debug!(uuid = %tracking_uuid, "remove_video_mix");
        self.command("remove_video_mix", || self.video.remove_video_mix(tracking_uuid))
            .is_some()
    }

    pub fn change_framerate(&self, fps_num: u32, fps_den: u32) -> bool {
        debug!(fps_num, fps_den, "change_framerate");
        self.command("change_framerate", || self.video.change_framerate(fps_num, fps_den))
            .is_some()
    }

    pub fn change_resolution(
        &self,
        base_width: u32,
        base_height: u32,
        output_width: u32,
        output_height: u32,
    ) -> bool {
        debug!(
            base_width,
            base_height, output_width, output_height, "change_resolution"
        );
        self.command("change_resolution", || {
            self.video
                .change_resolution(base_width, base_height, output_width, output_height)
        })
        .is_some()
    }

    pub fn video_settings(&self) -> VideoSettings {
        self.video.settings()
    }

    /// Native handle behind `uuid`
    pub fn native_handle(&self, uuid: &str) -> Option<NativeHandle> {
        self.registry.lookup(uuid).ok()
    }

    /// Method-channel entry point
    ///
    /// Arguments are a JSON object with snake_case keys
    /// (`source_uuid`, `scene_uuid`, `tracking_uuid`, ...). Missing or
    /// malformed arguments fail the call the same way an engine error does.
    /// Unknown methods return `null`.
    pub fn dispatch(&self, method: &str, args: Value) -> Value {
        debug!(method, "Dispatching method call");
        let args = Args(&args);
        match method {
            "obsStartup" => json!(self.is_started()),
            "obsShutdown" => {
                self.shutdown();
                json!(true)
            }

            "initializeTexture" => json!(
                args.str("tracking_uuid")
                    .map_or(sentinel::INVALID_TEXTURE, |uuid| self.register_frame_capture(uuid))
            ),
            "disposeTexture" => json!(
                args.i64("textureId")
                    .is_some_and(|id| self.dispose_texture(id))
            ),
            "removeFrameCapture" => json!(
                args.str("tracking_uuid")
                    .is_some_and(|uuid| self.unregister_frame_capture(uuid))
            ),

            "createSource" => json!(self.dispatch_create(&args, args.source_kind())),
            "createMediaSource" => json!(self.dispatch_create(
                &args,
                args.str("local_file").map(|file| SourceKind::Media {
                    local_file: file.into(),
                    looping: args.bool("looping").unwrap_or(false),
                }),
            )),
            "createImageSource" => json!(self.dispatch_create(
                &args,
                args.str("file")
                    .map(|file| SourceKind::Image { file: file.into() }),
            )),
            "createVideoSource" => json!(self.dispatch_create(
                &args,
                args.str("device_uid").map(|uid| SourceKind::VideoCapture {
                    device_name: args.str("device_name").unwrap_or(uid).into(),
                    device_uid: uid.into(),
                }),
            )),
            "createAudioSource" => json!(self.dispatch_create(
                &args,
                args.str("device_uid").map(|uid| SourceKind::AudioCapture {
                    device_uid: uid.into(),
                }),
            )),
            "addSourceFrameCallback" => json!(
                args.str("source_uuid")
                    .is_some_and(|uuid| self.add_source_frame_callback(uuid))
            ),
            "removeSourceFrameCallback" => json!(
                args.str("source_uuid")
                    .is_some_and(|uuid| self.remove_source_frame_callback(uuid))
            ),
            "releaseSource" => json!(
                args.str("source_uuid")
                    .is_some_and(|uuid| self.release_source(uuid))
            ),

            "createScene" => json!(args.str("scene_uuid").is_some_and(|uuid| {
                self.create_scene(uuid, args.str("name").unwrap_or(uuid))
            })),
            "releaseScene" => json!(
                args.str("scene_uuid")
                    .is_some_and(|uuid| self.release_scene(uuid))
            ),
            "addSource" => json!(match (args.str("scene_uuid"), args.str("source_uuid")) {
                (Some(scene), Some(source)) => self.add_source(scene, source),
                _ => sentinel::INVALID_ITEM_ID,
            }),
            "removeSceneItem" => json!(match (args.str("scene_uuid"), args.i64("item_id")) {
                (Some(scene), Some(item_id)) => self.remove_scene_item(scene, item_id),
                _ => false,
            }),
            "getSceneItemInfo" => match (args.str("scene_uuid"), args.i64("item_id")) {
                (Some(scene), Some(item_id)) => self
                    .get_scene_item_info(scene, item_id)
                    .and_then(|info| serde_json::to_value(info).ok())
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            "setSceneItemInfo" => json!(
                match (args.str("scene_uuid"), args.i64("item_id"), args.item_update()) {
                    (Some(scene), Some(item_id), Some(update)) => {
                        self.set_scene_item_info(scene, item_id, &update)
                    }
                    _ => false,
                }
            ),

            "mediaPlayPause" => json!(match (args.str("source_uuid"), args.bool("pause")) {
                (Some(uuid), Some(pause)) => self.media_play_pause(uuid, pause),
                _ => false,
            }),
            "mediaRestart" => json!(
                args.str("source_uuid")
                    .is_some_and(|uuid| self.media_restart(uuid))
            ),
            "mediaStop" => json!(
                args.str("source_uuid")
                    .is_some_and(|uuid| self.media_stop(uuid))
            ),
            "mediaGetDuration" => json!(
                args.str("source_uuid")
                    .map_or(sentinel::INVALID_TIME, |uuid| self.media_get_duration(uuid))
            ),
            "mediaGetTime" => json!(
                args.str("source_uuid")
                    .map_or(sentinel::INVALID_TIME, |uuid| self.media_get_time(uuid))
            ),
            "mediaSetTime" => json!(match (args.str("source_uuid"), args.i64("ms")) {
                (Some(uuid), Some(ms)) => self.media_set_time(uuid, ms),
                _ => false,
            }),
            "mediaGetState" => json!(
                args.str("source_uuid")
                    .map_or(sentinel::UNKNOWN_STATE, |uuid| self.media_get_state(uuid))
            ),

            "startStopStream" => json!(match args.bool("start") {
                Some(true) => self.stream_start(),
                Some(false) => self.stream_stop(),
                None => false,
            }),
            "outputGetState" => json!(self.get_output_state()),

            "getInputTypes" => json!(self.input_types()),
            "getInputsFromType" => json!(
                args.str("type_id")
                    .map(|type_id| self.inputs_from_type(type_id))
                    .unwrap_or_default()
            ),
            "getAudioInputs" => json!(self.audio_inputs()),
            "getVideoInputs" => json!(self.video_inputs()),

            "addVolumeMeterCallback" => json!(
                args.str("source_uuid")
                    .map_or(sentinel::INVALID_TOKEN, |uuid| self.add_volmeter_callback(uuid))
            ),
            "removeVolumeMeterCallback" => json!(
                args.i64("token")
                    .is_some_and(|token| self.remove_volmeter_callback(token))
            ),

            "createVideoMix" => json!(
                args.str("tracking_uuid")
                    .is_some_and(|uuid| self.add_video_mix(uuid))
            ),
            "removeVideoMix" => json!(
                args.str("tracking_uuid")
                    .is_some_and(|uuid| self.remove_video_mix(uuid))
            ),
            "changeFrameRate" => json!(match (args.u32("numerator"), args.u32("denominator")) {
                (Some(num), Some(den)) => self.change_framerate(num, den),
                _ => false,
            }),
            "changeResolution" => json!(
                match (
                    args.u32("base_width"),
                    args.u32("base_height"),
                    args.u32("output_width"),
                    args.u32("output_height"),
                ) {
                    (Some(bw), Some(bh), Some(ow), Some(oh)) => self.change_resolution(bw, bh, ow, oh),
                    _ => false,
                }
            ),

            _ => {
                warn!(method, "Method not implemented");
                Value::Null
            }
        }
    }

    fn dispatch_create(&self, args: &Args<'_>, kind: Option<SourceKind>) -> bool {
        match (args.str("source_uuid"), kind) {
            (Some(uuid), Some(kind)) => self.create_source(
                uuid,
                &kind,
                args.str("name").unwrap_or(uuid),
                args.bool("frame_source").unwrap_or(false),
            ),
            _ => {
                warn!("Create source call without uuid or kind");
                false
            }
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn clamp_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

/// Typed accessors over a method-call argument object
struct Args<'a>(&'a Value);

impl<'a> Args<'a> {
    fn str(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    fn u32(&self, key: &str) -> Option<u32> {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Tagged source kind carried inline with the other arguments
    fn source_kind(&self) -> Option<SourceKind> {
        serde_json::from_value(self.0.clone())
            .inspect_err(|e| debug!(error = %e, "Invalid source kind"))
            .ok()
    }

    fn item_update(&self) -> Option<SceneItemUpdate> {
        let info = self.0.get("info")?;
        serde_json::from_value(info.clone())
            .inspect_err(|e| debug!(error = %e, "Invalid scene item info"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MemoryTextureRegistry;
    use crate::engine::SoftwareEngine;
    use crate::media::MediaState;

    fn bridge() -> Bridge {
        let mut config = Config::default();
        config.output.start_delay_ms = 5;
        config.output.stop_delay_ms = 5;
        config.video.output_width = 64;
        config.video.output_height = 36;
        let engine: EngineContext = Arc::new(SoftwareEngine::new(config.clone()));
        Bridge::startup(engine, Arc::new(MemoryTextureRegistry::new()), &config).unwrap()
    }

    fn color(id: &str) -> SourceKind {
        SourceKind::Generic {
            source_id: id.into(),
        }
    }

    #[test]
    fn test_failed_startup() {
        let config = Config::default();
        let engine: EngineContext = Arc::new(SoftwareEngine::with_failing_startup(config.clone()));
        let result = Bridge::startup(engine, Arc::new(MemoryTextureRegistry::new()), &config);
        assert!(matches!(result, Err(BridgeError::EngineNotStarted)));
    }

    #[test]
    fn test_errors_reduce_to_sentinels() {
        let bridge = bridge();
        assert_eq!(bridge.add_source("nope", "nope"), sentinel::INVALID_ITEM_ID);
        assert_eq!(bridge.media_get_time("nope"), sentinel::INVALID_TIME);
        assert_eq!(bridge.media_get_duration("nope"), sentinel::INVALID_TIME);
        assert_eq!(bridge.media_get_state("nope"), sentinel::UNKNOWN_STATE);
        assert_eq!(bridge.add_volmeter_callback("nope"), sentinel::INVALID_TOKEN);
        assert!(!bridge.release_source("nope"));
        assert!(!bridge.dispose_texture(42));
        assert!(bridge.get_scene_item_info("nope", 0).is_none());
    }

    #[test]
    fn test_release_source_detaches_everything() {
        let bridge = bridge();
        assert!(bridge.create_source("bars", &color("color_source"), "Bars", true));
        assert!(bridge.register_frame_capture("bars") > 0);
        assert!(bridge.create_scene("s", "Scene"));
        assert_eq!(bridge.add_source("s", "bars"), 0);

        assert!(bridge.release_source("bars"));
        assert!(bridge.get_scene_item_info("s", 0).is_none());
        assert!(bridge.capture_stats("bars").is_none());
        assert!(bridge.native_handle("bars").is_none());
        // uuid is free again
        assert!(bridge.create_source("bars", &color("color_source"), "Bars", false));
    }

    #[test]
    fn test_shutdown_fails_later_commands() {
        let bridge = bridge();
        assert!(bridge.create_scene("s", "Scene"));
        bridge.shutdown();
        assert!(!bridge.is_started());
        assert!(bridge.native_handle("s").is_none());
        assert!(!bridge.create_scene("s2", "Scene"));
        assert!(bridge.input_types().is_empty());
    }

    #[test]
    fn test_dispatch_scene_flow() {
        let bridge = bridge();
        let created = bridge.dispatch(
            "createSource",
            json!({
                "source_uuid": "c1",
                "name": "Color",
                "kind": "generic",
                "source_id": "color_source",
            }),
        );
        assert_eq!(created, json!(true));
        assert_eq!(
            bridge.dispatch("createScene", json!({"scene_uuid": "t1", "name": "A"})),
            json!(true)
        );
        assert_eq!(
            bridge.dispatch("addSource", json!({"scene_uuid": "t1", "source_uuid": "c1"})),
            json!(0)
        );
        assert_eq!(
            bridge.dispatch(
                "setSceneItemInfo",
                json!({"scene_uuid": "t1", "item_id": 0, "info": {"visible": false}})
            ),
            json!(true)
        );
        let info = bridge.dispatch("getSceneItemInfo", json!({"scene_uuid": "t1", "item_id": 0}));
        assert_eq!(info["visible"], json!(false));
        assert_eq!(info["scale"]["x"], json!(1.0));
    }

    #[test]
    fn test_dispatch_bad_arguments() {
        let bridge = bridge();
        assert_eq!(bridge.dispatch("addSource", json!({})), json!(-1));
        assert_eq!(bridge.dispatch("mediaGetState", json!(null)), json!(0));
        assert_eq!(bridge.dispatch("createSource", json!({"source_uuid": "x"})), json!(false));
        assert_eq!(bridge.dispatch("changeFrameRate", json!({"numerator": 30})), json!(false));
        assert_eq!(bridge.dispatch("noSuchMethod", json!({})), Value::Null);
    }

    #[test]
    fn test_media_state_code_matches_controller() {
        let bridge = bridge();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"").unwrap();
        let kind = SourceKind::Media {
            local_file: file,
            looping: false,
        };
        assert!(bridge.create_source("m", &kind, "Clip", false));
        assert_eq!(bridge.media_get_state("m"), MediaState::Stopped.code());
        assert!(bridge.media_play_pause("m", false));
        assert_eq!(bridge.media_get_state("m"), MediaState::Playing.code());
    }
}

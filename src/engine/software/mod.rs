// SPDX-License-Identifier: GPL-3.0-only

//! In-process software engine
//!
//! A complete [`Engine`] that needs no native library:
//!
//! - video capture devices come from the configured catalog and render
//!   scrolling color bars
//! - image sources are decoded with the `image` crate
//! - media sources check the file and run a wall-clock [`MediaClock`]
//! - the output mix reaches Running/Stopped after the configured delays
//! - volume meters emit synthetic tone levels
//!
//! Every producer (source frames, video mixes, meters) runs on its own
//! [`CaptureLoopController`] thread. Producers are always stopped after the
//! state lock is released, so a producer callback can never deadlock against a
//! command.

mod clock;
mod render;

pub use clock::MediaClock;

use super::frame_loop::CaptureLoopController;
use super::{
    Engine, FrameCallback, InputDescriptor, NativeHandle, NativeMediaStatus, OutputEvent,
    OutputListener, SourceKind, VolumeCallback,
};
use crate::capture::{FrameBuffer, PixelFormat};
use crate::config::{Config, VideoSettings};
use crate::constants::{file_formats, input_types, video, volume};
use crate::errors::{BridgeError, BridgeResult};
use crate::scene::SceneItemInfo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a source renders into its frame output
#[derive(Clone)]
enum Content {
    Bars {
        width: u32,
        height: u32,
        phases: Arc<Vec<Arc<[u8]>>>,
    },
    Still(Arc<FrameBuffer>),
    Solid {
        width: u32,
        height: u32,
        data: Arc<[u8]>,
    },
    /// Audio only
    Silent,
}

impl Content {
    fn frame(&self, tick: usize) -> Option<FrameBuffer> {
        match self {
            Content::Bars {
                width,
                height,
                phases,
            } => {
                let data = Arc::clone(&phases[tick % phases.len()]);
                Some(FrameBuffer::new(*width, *height, PixelFormat::BGRA, data))
            }
            Content::Still(frame) => {
                let mut frame = FrameBuffer::clone(frame);
                frame.captured_at = Instant::now();
                Some(frame)
            }
            Content::Solid {
                width,
                height,
                data,
            } => Some(FrameBuffer::new(
                *width,
                *height,
                PixelFormat::BGRA,
                Arc::clone(data),
            )),
            Content::Silent => None,
        }
    }
}

struct SoftSource {
    kind: SourceKind,
    name: String,
    content: Content,
    clock: Option<Arc<Mutex<MediaClock>>>,
    producer: Option<CaptureLoopController>,
}

struct SoftScene {
    name: String,
    /// Render order, last on top
    items: Vec<NativeHandle>,
}

struct SoftItem {
    scene: NativeHandle,
    source: NativeHandle,
    info: SceneItemInfo,
}

struct SoftMeter {
    source: NativeHandle,
    producer: CaptureLoopController,
}

#[derive(Default)]
struct SoftwareState {
    video: VideoSettings,
    sources: HashMap<NativeHandle, SoftSource>,
    scenes: HashMap<NativeHandle, SoftScene>,
    items: HashMap<NativeHandle, SoftItem>,
    /// Capture device uid → source holding it
    devices_in_use: HashMap<String, NativeHandle>,
    mixes: HashMap<NativeHandle, CaptureLoopController>,
    meters: HashMap<NativeHandle, SoftMeter>,
}

impl SoftwareState {
    fn remove_item(&mut self, item: NativeHandle) -> bool {
        let Some(removed) = self.items.remove(&item) else {
            return false;
        };
        if let Some(scene) = self.scenes.get_mut(&removed.scene) {
            scene.items.retain(|h| *h != item);
        }
        true
    }
}

#[derive(Default)]
struct OutputSim {
    listener: Option<OutputListener>,
    active: bool,
    /// Bumped on every start/stop so stale delayed events are dropped
    generation: u64,
    fail_next_start: bool,
}

/// Software implementation of [`Engine`]
pub struct SoftwareEngine {
    config: Config,
    fail_startup: bool,
    started: AtomicBool,
    epoch: Instant,
    next_handle: AtomicU64,
    pattern: OnceLock<Arc<Vec<Arc<[u8]>>>>,
    state: Mutex<SoftwareState>,
    output: Arc<Mutex<OutputSim>>,
}

impl SoftwareEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fail_startup: false,
            started: AtomicBool::new(false),
            epoch: Instant::now(),
            next_handle: AtomicU64::new(1),
            pattern: OnceLock::new(),
            state: Mutex::new(SoftwareState::default()),
            output: Arc::new(Mutex::new(OutputSim::default())),
        }
    }

    /// An engine whose [`Engine::startup`] always fails
    pub fn with_failing_startup(config: Config) -> Self {
        Self {
            fail_startup: true,
            ..Self::new(config)
        }
    }

    fn ensure_started(&self) -> BridgeResult<()> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::EngineNotStarted)
        }
    }

    fn allocate(&self) -> NativeHandle {
        NativeHandle(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    fn bars(&self) -> Content {
        let phases = self.pattern.get_or_init(|| {
            Arc::new(render::bar_frames(
                video::PATTERN_WIDTH,
                video::PATTERN_HEIGHT,
            ))
        });
        Content::Bars {
            width: video::PATTERN_WIDTH,
            height: video::PATTERN_HEIGHT,
            phases: Arc::clone(phases),
        }
    }

    fn catalog_has(devices: &[InputDescriptor], uid: &str) -> BridgeResult<()> {
        if devices.iter().any(|d| d.id == uid) {
            Ok(())
        } else {
            Err(BridgeError::DeviceUnavailable(format!("no device {}", uid)))
        }
    }

    fn timestamp_ns(epoch: Instant) -> u64 {
        epoch.elapsed().as_nanos() as u64
    }

    fn spawn_producer(
        &self,
        name: &str,
        interval: Duration,
        content: Content,
        clock: Option<Arc<Mutex<MediaClock>>>,
        output: FrameCallback,
    ) -> CaptureLoopController {
        let epoch = self.epoch;
        let mut tick = 0usize;
        CaptureLoopController::start_paced(name, interval, move || {
            // Media sources only produce while playing; the last frame stays on screen
            if let Some(clock) = &clock
                && !clock.lock().is_playing()
            {
                return;
            }
            if let Some(frame) = content.frame(tick) {
                output(frame.with_timestamp(Self::timestamp_ns(epoch)));
            }
            tick = tick.wrapping_add(1);
        })
    }

    fn media_clock(&self, source: NativeHandle) -> BridgeResult<Arc<Mutex<MediaClock>>> {
        self.ensure_started()?;
        let state = self.state.lock();
        let entry = state
            .sources
            .get(&source)
            .ok_or_else(|| BridgeError::not_found(format!("source {}", source)))?;
        entry
            .clock
            .clone()
            .ok_or_else(|| BridgeError::Unsupported(format!("{} is not a media source", entry.name)))
    }

    /// Run `event` through the output listener after `delay`, unless another
    /// start/stop happened meanwhile
    fn emit_later(&self, generation: u64, delay: Duration, event: OutputEvent) -> BridgeResult<()> {
        let output = Arc::clone(&self.output);
        std::thread::Builder::new()
            .name("output-transition".into())
            .spawn(move || {
                std::thread::sleep(delay);
                let listener = {
                    let mut sim = output.lock();
                    if sim.generation != generation {
                        debug!(?event, "Output transition superseded");
                        return;
                    }
                    if matches!(event, OutputEvent::Failed(_)) {
                        sim.active = false;
                    }
                    sim.listener.clone()
                };
                if let Some(listener) = listener {
                    listener(event);
                }
            })
            .map(|_| ())
            .map_err(|e| BridgeError::engine_fault(format!("output thread: {}", e)))
    }

    // ===== Fault injection =====

    /// Put a media source into a decoder fault
    ///
    /// Returns `false` if `source` is not a media source.
    pub fn inject_media_fault(&self, source: NativeHandle, msg: &str) -> bool {
        match self.media_clock(source) {
            Ok(clock) => {
                clock.lock().fault(msg);
                warn!(source = %source, msg, "Injected media fault");
                true
            }
            Err(_) => false,
        }
    }

    /// Fail the running output mix
    ///
    /// Returns `false` if the output is not active.
    pub fn inject_output_fault(&self, msg: &str) -> bool {
        let listener = {
            let mut sim = self.output.lock();
            if !sim.active {
                return false;
            }
            sim.active = false;
            sim.generation += 1;
            sim.listener.clone()
        };
        warn!(msg, "Injected output fault");
        if let Some(listener) = listener {
            listener(OutputEvent::Failed(msg.to_string()));
        }
        true
    }

    /// Make the next output start report a failure instead of Started
    pub fn fail_next_output_start(&self) {
        self.output.lock().fail_next_start = true;
    }

    // ===== Introspection =====

    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }

    pub fn scene_item_count(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Producer threads currently running (frame outputs, mixes, meters)
    pub fn running_producers(&self) -> usize {
        let state = self.state.lock();
        let sources = state
            .sources
            .values()
            .filter(|s| s.producer.as_ref().is_some_and(|p| p.is_running()))
            .count();
        let mixes = state.mixes.values().filter(|p| p.is_running()).count();
        let meters = state
            .meters
            .values()
            .filter(|m| m.producer.is_running())
            .count();
        sources + mixes + meters
    }

    pub fn video_settings(&self) -> VideoSettings {
        self.state.lock().video
    }
}

impl Engine for SoftwareEngine {
    fn name(&self) -> &str {
        "software"
    }

    fn startup(&self, video: &VideoSettings) -> BridgeResult<()> {
        if self.fail_startup {
            return Err(BridgeError::engine_fault("software engine startup failed"));
        }
        video.validate()?;
        self.state.lock().video = *video;
        if !self.started.swap(true, Ordering::SeqCst) {
            info!(
                width = video.base_width,
                height = video.base_height,
                fps_num = video.fps_num,
                fps_den = video.fps_den,
                "Software engine started"
            );
        }
        Ok(())
    }

    fn reset_video(&self, video: &VideoSettings) -> BridgeResult<()> {
        self.ensure_started()?;
        video.validate()?;
        let mut state = self.state.lock();
        if !state.mixes.is_empty() {
            return Err(BridgeError::invalid_transition(format!(
                "{} video mixes still attached",
                state.mixes.len()
            )));
        }
        state.video = *video;
        info!(
            width = video.base_width,
            height = video.base_height,
            fps_num = video.fps_num,
            fps_den = video.fps_den,
            "Video reset"
        );
        Ok(())
    }

    fn create_source(&self, kind: &SourceKind, name: &str) -> BridgeResult<NativeHandle> {
        self.ensure_started()?;

        let (content, clock) = match kind {
            SourceKind::Media {
                local_file,
                looping,
            } => {
                if !file_formats::has_extension(local_file, file_formats::MEDIA_EXTENSIONS) {
                    return Err(BridgeError::Unsupported(format!(
                        "media format of {}",
                        local_file.display()
                    )));
                }
                if !local_file.is_file() {
                    return Err(BridgeError::DeviceUnavailable(format!(
                        "cannot open {}",
                        local_file.display()
                    )));
                }
                let clock = MediaClock::new(self.config.software.media_duration_ms, *looping);
                (self.bars(), Some(Arc::new(Mutex::new(clock))))
            }
            SourceKind::VideoCapture { device_uid, .. } => {
                Self::catalog_has(&self.config.software.video_devices, device_uid)?;
                (self.bars(), None)
            }
            SourceKind::AudioCapture { device_uid } => {
                Self::catalog_has(&self.config.software.audio_devices, device_uid)?;
                (Content::Silent, None)
            }
            SourceKind::Image { file } => (Content::Still(Arc::new(render::load_image(file)?)), None),
            SourceKind::Generic { source_id } if source_id == input_types::COLOR => {
                let (width, height) = (video::PATTERN_WIDTH, video::PATTERN_HEIGHT);
                let data = render::solid(width, height, [48, 48, 48, 255]);
                (
                    Content::Solid {
                        width,
                        height,
                        data,
                    },
                    None,
                )
            }
            SourceKind::Generic { source_id } => {
                return Err(BridgeError::Unsupported(format!("input type {}", source_id)));
            }
        };

        let handle = self.allocate();
        let mut state = self.state.lock();
        if let Some(uid) = kind.device_uid() {
            if let Some(holder) = state.devices_in_use.get(uid) {
                return Err(BridgeError::DeviceUnavailable(format!(
                    "{} is in use by source {}",
                    uid, holder
                )));
            }
            state.devices_in_use.insert(uid.to_string(), handle);
        }
        state.sources.insert(
            handle,
            SoftSource {
                kind: kind.clone(),
                name: name.to_string(),
                content,
                clock,
                producer: None,
            },
        );
        info!(handle = %handle, name = %name, kind = kind.input_type(), "Created source");
        Ok(handle)
    }

    fn release_source(&self, source: NativeHandle) {
        let (released, meters) = {
            let mut state = self.state.lock();
            let Some(released) = state.sources.remove(&source) else {
                return;
            };
            if let Some(uid) = released.kind.device_uid() {
                state.devices_in_use.remove(uid);
            }
            let items: Vec<NativeHandle> = state
                .items
                .iter()
                .filter(|(_, item)| item.source == source)
                .map(|(handle, _)| *handle)
                .collect();
            for item in items {
                state.remove_item(item);
            }
            let meter_handles: Vec<NativeHandle> = state
                .meters
                .iter()
                .filter(|(_, meter)| meter.source == source)
                .map(|(handle, _)| *handle)
                .collect();
            let meters: Vec<SoftMeter> = meter_handles
                .iter()
                .filter_map(|handle| state.meters.remove(handle))
                .collect();
            (released, meters)
        };
        // Producer threads are joined here, outside the lock
        drop(meters);
        info!(handle = %source, name = %released.name, "Released source");
        drop(released);
    }

    fn set_frame_output(
        &self,
        source: NativeHandle,
        output: Option<FrameCallback>,
    ) -> BridgeResult<()> {
        self.ensure_started()?;
        let (previous, spawn) = {
            let mut state = self.state.lock();
            let interval = state.video.frame_interval();
            let entry = state
                .sources
                .get_mut(&source)
                .ok_or_else(|| BridgeError::not_found(format!("source {}", source)))?;
            if !entry.kind.has_video() {
                return Err(BridgeError::Unsupported(format!(
                    "{} has no video",
                    entry.name
                )));
            }
            let spawn = output.map(|output| {
                (
                    entry.name.clone(),
                    entry.content.clone(),
                    entry.clock.clone(),
                    output,
                    interval,
                )
            });
            (entry.producer.take(), spawn)
        };
        drop(previous);

        let Some((name, content, clock, output, interval)) = spawn else {
            debug!(source = %source, "Frame output detached");
            return Ok(());
        };
        let producer = self.spawn_producer(&name, interval, content, clock, output);

        let mut state = self.state.lock();
        if let Some(entry) = state.sources.get_mut(&source) {
            entry.producer = Some(producer);
            debug!(source = %source, "Frame output attached");
            return Ok(());
        }
        drop(state);
        drop(producer);
        Err(BridgeError::not_found(format!("source {}", source)))
    }

    fn create_scene(&self, name: &str) -> BridgeResult<NativeHandle> {
        self.ensure_started()?;
        let handle = self.allocate();
        self.state.lock().scenes.insert(
            handle,
            SoftScene {
                name: name.to_string(),
                items: Vec::new(),
            },
        );
        info!(handle = %handle, name = %name, "Created scene");
        Ok(handle)
    }

    fn release_scene(&self, scene: NativeHandle) {
        let mut state = self.state.lock();
        let Some(released) = state.scenes.remove(&scene) else {
            return;
        };
        for item in &released.items {
            state.items.remove(item);
        }
        info!(handle = %scene, name = %released.name, "Released scene");
    }

    fn scene_add(&self, scene: NativeHandle, source: NativeHandle) -> BridgeResult<NativeHandle> {
        self.ensure_started()?;
        let handle = self.allocate();
        let mut state = self.state.lock();
        if !state.sources.contains_key(&source) {
            return Err(BridgeError::not_found(format!("source {}", source)));
        }
        let target = state
            .scenes
            .get_mut(&scene)
            .ok_or_else(|| BridgeError::not_found(format!("scene {}", scene)))?;
        target.items.push(handle);
        let info = SceneItemInfo {
            order: target.items.len() - 1,
            ..SceneItemInfo::default()
        };
        state.items.insert(
            handle,
            SoftItem {
                scene,
                source,
                info,
            },
        );
        Ok(handle)
    }

    fn scene_item_remove(&self, item: NativeHandle) {
        self.state.lock().remove_item(item);
    }

    fn scene_item_apply(&self, item: NativeHandle, info: &SceneItemInfo) -> BridgeResult<()> {
        self.ensure_started()?;
        let mut state = self.state.lock();
        let entry = state
            .items
            .get_mut(&item)
            .ok_or_else(|| BridgeError::not_found(format!("scene item {}", item)))?;
        entry.info = *info;
        let scene = entry.scene;
        if let Some(scene) = state.scenes.get_mut(&scene) {
            scene.items.retain(|h| *h != item);
            let order = info.order.min(scene.items.len());
            scene.items.insert(order, item);
        }
        Ok(())
    }

    fn media_duration(&self, source: NativeHandle) -> BridgeResult<u64> {
        Ok(self.media_clock(source)?.lock().duration_ms())
    }

    fn media_time(&self, source: NativeHandle) -> BridgeResult<u64> {
        Ok(self.media_clock(source)?.lock().time_ms())
    }

    fn media_play(&self, source: NativeHandle, from_ms: u64) -> BridgeResult<()> {
        self.media_clock(source)?.lock().play(from_ms);
        Ok(())
    }

    fn media_pause(&self, source: NativeHandle) -> BridgeResult<()> {
        self.media_clock(source)?.lock().pause()
    }

    fn media_resume(&self, source: NativeHandle) -> BridgeResult<()> {
        self.media_clock(source)?.lock().resume()
    }

    fn media_seek(&self, source: NativeHandle, ms: u64) -> BridgeResult<()> {
        self.media_clock(source)?.lock().seek(ms)
    }

    fn media_stop(&self, source: NativeHandle) -> BridgeResult<()> {
        self.media_clock(source)?.lock().stop();
        Ok(())
    }

    fn media_status(&self, source: NativeHandle) -> BridgeResult<NativeMediaStatus> {
        Ok(self.media_clock(source)?.lock().status())
    }

    fn set_output_listener(&self, listener: OutputListener) {
        self.output.lock().listener = Some(listener);
    }

    fn output_start(&self) -> BridgeResult<()> {
        self.ensure_started()?;
        let (generation, fail) = {
            let mut sim = self.output.lock();
            sim.generation += 1;
            sim.active = true;
            (sim.generation, std::mem::take(&mut sim.fail_next_start))
        };
        let event = if fail {
            OutputEvent::Failed("encoder failed to start".into())
        } else {
            OutputEvent::Started
        };
        info!("Output mix starting");
        self.emit_later(
            generation,
            Duration::from_millis(self.config.output.start_delay_ms),
            event,
        )
    }

    fn output_stop(&self) -> BridgeResult<()> {
        self.ensure_started()?;
        let generation = {
            let mut sim = self.output.lock();
            sim.generation += 1;
            sim.active = false;
            sim.generation
        };
        info!("Output mix stopping");
        self.emit_later(
            generation,
            Duration::from_millis(self.config.output.stop_delay_ms),
            OutputEvent::Stopped,
        )
    }

    fn add_video_mix(&self, output: FrameCallback) -> BridgeResult<NativeHandle> {
        self.ensure_started()?;
        let video = self.state.lock().video;
        let (width, height) = (video.output_width, video.output_height);
        let content = Content::Bars {
            width,
            height,
            phases: Arc::new(vec![render::color_bars(width, height, 0)]),
        };
        let handle = self.allocate();
        let producer = self.spawn_producer(
            &format!("mix-{}", handle.0),
            video.frame_interval(),
            content,
            None,
            output,
        );
        self.state.lock().mixes.insert(handle, producer);
        info!(handle = %handle, width, height, "Added video mix");
        Ok(handle)
    }

    fn remove_video_mix(&self, mix: NativeHandle) {
        let removed = self.state.lock().mixes.remove(&mix);
        if removed.is_some() {
            drop(removed);
            info!(handle = %mix, "Removed video mix");
        }
    }

    fn add_volmeter(
        &self,
        source: NativeHandle,
        callback: VolumeCallback,
    ) -> BridgeResult<(NativeHandle, usize)> {
        self.ensure_started()?;
        let clock = {
            let state = self.state.lock();
            let entry = state
                .sources
                .get(&source)
                .ok_or_else(|| BridgeError::not_found(format!("source {}", source)))?;
            if !entry.kind.has_audio() {
                return Err(BridgeError::Unsupported(format!("{} has no audio", entry.name)));
            }
            entry.clock.clone()
        };

        let channels = volume::DEFAULT_CHANNELS;
        let interval = Duration::from_millis(self.config.volume_interval_ms.max(1));
        let meter = self.allocate();
        let mut tick = 0u64;
        let producer = CaptureLoopController::start_paced(
            &format!("volmeter-{}", meter.0),
            interval,
            move || {
                let audible = clock.as_ref().is_none_or(|c| c.lock().is_playing());
                let levels = if audible {
                    render::tone_levels(tick, channels)
                } else {
                    render::silence(channels)
                };
                tick = tick.wrapping_add(1);
                callback(levels);
            },
        );

        let mut state = self.state.lock();
        if !state.sources.contains_key(&source) {
            drop(state);
            drop(producer);
            return Err(BridgeError::not_found(format!("source {}", source)));
        }
        state.meters.insert(meter, SoftMeter { source, producer });
        debug!(source = %source, meter = %meter, channels, "Added volume meter");
        Ok((meter, channels))
    }

    fn remove_volmeter(&self, meter: NativeHandle) {
        let removed = self.state.lock().meters.remove(&meter);
        if removed.is_some() {
            drop(removed);
            debug!(meter = %meter, "Removed volume meter");
        }
    }

    fn input_types(&self) -> Vec<InputDescriptor> {
        vec![
            InputDescriptor::new(input_types::VIDEO_CAPTURE, "Video Capture Device"),
            InputDescriptor::new(input_types::AUDIO_CAPTURE, "Audio Input Capture"),
            InputDescriptor::new(input_types::MEDIA, "Media Source"),
            InputDescriptor::new(input_types::IMAGE, "Image"),
            InputDescriptor::new(input_types::COLOR, "Color Source"),
        ]
    }

    fn inputs_from_type(&self, type_id: &str) -> Vec<InputDescriptor> {
        match type_id {
            input_types::VIDEO_CAPTURE => self.config.software.video_devices.clone(),
            input_types::AUDIO_CAPTURE => self.config.software.audio_devices.clone(),
            _ => Vec::new(),
        }
    }
}

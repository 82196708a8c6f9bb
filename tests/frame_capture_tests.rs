// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for frame delivery to textures

use scenebridge::capture::{FrameCapture, TextureId};
use scenebridge::constants::video;
use scenebridge::{
    Bridge, Config, EngineContext, FrameBuffer, MemoryTextureRegistry, PixelFormat,
    SoftwareEngine, SourceKind,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn frame(width: u32, fill: u8) -> FrameBuffer {
    let data = vec![fill; (width * 2 * 4) as usize];
    FrameBuffer::new(width, 2, PixelFormat::BGRA, data)
}

fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(value) = poll() {
            return Some(value);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    None
}

#[test]
fn test_latest_frame_wins() {
    let textures = Arc::new(MemoryTextureRegistry::new());
    let capture = FrameCapture::new(textures.clone());
    let id = capture.register("src").unwrap();

    capture.deliver("src", frame(4, 1));
    capture.deliver("src", frame(8, 2));

    let seen = textures.frame(id).unwrap();
    assert_eq!(seen.width, 8);
    assert_eq!(seen.data[0], 2);
    assert_eq!(textures.frames_available(id), 2);

    let stats = capture.stats("src").unwrap();
    assert_eq!(stats.samples, 2);
    assert_eq!(stats.dropped, 1);
}

#[test]
fn test_delivery_without_sink_is_dropped() {
    let textures = Arc::new(MemoryTextureRegistry::new());
    let capture = FrameCapture::new(textures.clone());
    capture.deliver("nobody", frame(4, 1));
    assert!(capture.copy_frame("nobody").is_none());

    let id = capture.register("late").unwrap();
    assert!(textures.frame(id).is_none());
    capture.unregister("late").unwrap();
    capture.deliver("late", frame(4, 1));
    assert!(!textures.contains(id));
}

#[test]
fn test_capture_device_frames_reach_texture() {
    let config = Config::default();
    let textures = Arc::new(MemoryTextureRegistry::new());
    let engine: EngineContext = Arc::new(SoftwareEngine::new(config.clone()));
    let bridge = Bridge::startup(engine, textures.clone(), &config).unwrap();

    let texture_id = bridge.register_frame_capture("cam");
    assert!(texture_id > 0);
    // Registering twice returns the same texture
    assert_eq!(bridge.register_frame_capture("cam"), texture_id);

    let camera = SourceKind::VideoCapture {
        device_name: "Test Pattern Camera".into(),
        device_uid: "test-pattern-0".into(),
    };
    assert!(bridge.create_source("cam", &camera, "Camera", true));

    let seen = wait_for(|| textures.frame(TextureId(texture_id))).expect("no frame delivered");
    assert_eq!(seen.width, video::PATTERN_WIDTH);
    assert_eq!(seen.height, video::PATTERN_HEIGHT);
    assert!(seen.is_complete());

    assert!(bridge.dispose_texture(texture_id));
    assert!(!textures.contains(TextureId(texture_id)));
    assert!(!bridge.dispose_texture(texture_id));
    assert!(!bridge.unregister_frame_capture("cam"));
}

#[test]
fn test_refused_texture_returns_sentinel() {
    let config = Config::default();
    let textures = Arc::new(MemoryTextureRegistry::new());
    textures.set_accepting(false);
    let engine: EngineContext = Arc::new(SoftwareEngine::new(config.clone()));
    let bridge = Bridge::startup(engine, textures, &config).unwrap();
    assert_eq!(bridge.register_frame_capture("cam"), 0);
}

#[test]
fn test_video_mix_frames() {
    let mut config = Config::default();
    config.video.output_width = 32;
    config.video.output_height = 18;
    let textures = Arc::new(MemoryTextureRegistry::new());
    let engine: EngineContext = Arc::new(SoftwareEngine::new(config.clone()));
    let bridge = Bridge::startup(engine, textures, &config).unwrap();

    assert!(bridge.register_frame_capture("mix") > 0);
    assert!(bridge.add_video_mix("mix"));
    assert!(!bridge.add_video_mix("mix"));

    let seen = wait_for(|| bridge.take_frame("mix")).expect("no mix frame");
    assert_eq!((seen.width, seen.height), (32, 18));

    assert!(bridge.remove_video_mix("mix"));
    assert!(!bridge.remove_video_mix("mix"));
}

#[test]
fn test_frame_callback_on_existing_source() {
    let config = Config::default();
    let textures = Arc::new(MemoryTextureRegistry::new());
    let engine: EngineContext = Arc::new(SoftwareEngine::new(config.clone()));
    let bridge = Bridge::startup(engine, textures, &config).unwrap();

    let camera = SourceKind::VideoCapture {
        device_name: "Test Pattern Camera".into(),
        device_uid: "test-pattern-1".into(),
    };
    assert!(bridge.create_source("cam", &camera, "Camera", false));
    assert!(bridge.register_frame_capture("cam") > 0);
    std::thread::sleep(Duration::from_millis(50));
    assert!(bridge.take_frame("cam").is_none());

    assert!(bridge.add_source_frame_callback("cam"));
    assert!(wait_for(|| bridge.take_frame("cam")).is_some());

    assert!(bridge.remove_source_frame_callback("cam"));
    bridge.take_frame("cam");
    std::thread::sleep(Duration::from_millis(50));
    assert!(bridge.take_frame("cam").is_none());

    assert!(!bridge.add_source_frame_callback("missing"));
    let mic = SourceKind::AudioCapture {
        device_uid: "tone-0".into(),
    };
    assert!(bridge.create_source("mic", &mic, "Mic", false));
    assert!(!bridge.add_source_frame_callback("mic"));
}

// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for method-channel dispatch

use scenebridge::{Bridge, Config, EngineContext, MediaState, MemoryTextureRegistry, SoftwareEngine};
use serde_json::{Value, json};
use std::sync::Arc;

fn bridge() -> Bridge {
    let mut config = Config::default();
    config.output.start_delay_ms = 5;
    config.output.stop_delay_ms = 5;
    let engine: EngineContext = Arc::new(SoftwareEngine::new(config.clone()));
    Bridge::startup(engine, Arc::new(MemoryTextureRegistry::new()), &config).unwrap()
}

#[test]
fn test_startup_reported() {
    let bridge = bridge();
    assert_eq!(bridge.dispatch("obsStartup", Value::Null), json!(true));
}

#[test]
fn test_media_methods() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("clip.mkv");
    std::fs::write(&file, b"").unwrap();
    let bridge = bridge();

    let created = bridge.dispatch(
        "createMediaSource",
        json!({"source_uuid": "src1", "local_file": file.to_string_lossy()}),
    );
    assert_eq!(created, json!(true));

    let state = |bridge: &Bridge| bridge.dispatch("mediaGetState", json!({"source_uuid": "src1"}));
    assert_eq!(state(&bridge), json!(MediaState::Stopped.code()));
    assert_eq!(
        bridge.dispatch("mediaPlayPause", json!({"source_uuid": "src1", "pause": false})),
        json!(true)
    );
    assert_eq!(state(&bridge), json!(MediaState::Playing.code()));

    assert_eq!(
        bridge.dispatch("mediaSetTime", json!({"source_uuid": "src1", "ms": 500})),
        json!(true)
    );
    let time = bridge.dispatch("mediaGetTime", json!({"source_uuid": "src1"}));
    assert!(time.as_i64().unwrap() >= 500);

    assert_eq!(bridge.dispatch("mediaStop", json!({"source_uuid": "src1"})), json!(true));
    assert_eq!(bridge.dispatch("mediaGetTime", json!({"source_uuid": "src1"})), json!(0));
    assert_eq!(bridge.dispatch("mediaRestart", json!({"source_uuid": "src1"})), json!(true));
    assert_eq!(state(&bridge), json!(MediaState::Playing.code()));

    let duration = bridge.dispatch("mediaGetDuration", json!({"source_uuid": "src1"}));
    assert!(duration.as_i64().unwrap() > 0);
}

#[test]
fn test_missing_media_file() {
    let bridge = bridge();
    let created = bridge.dispatch(
        "createMediaSource",
        json!({"source_uuid": "src1", "local_file": "/nonexistent/clip.mp4"}),
    );
    assert_eq!(created, json!(false));
    assert_eq!(bridge.dispatch("mediaGetState", json!({"source_uuid": "src1"})), json!(0));
}

#[test]
fn test_video_source_and_texture() {
    let bridge = bridge();
    let texture = bridge.dispatch("initializeTexture", json!({"tracking_uuid": "cam"}));
    assert!(texture.as_i64().unwrap() > 0);

    let created = bridge.dispatch(
        "createVideoSource",
        json!({
            "source_uuid": "cam",
            "device_name": "Test Pattern Camera",
            "device_uid": "test-pattern-1",
            "frame_source": true,
        }),
    );
    assert_eq!(created, json!(true));
    assert_eq!(bridge.dispatch("disposeTexture", json!({"textureId": texture})), json!(true));
    assert_eq!(bridge.dispatch("releaseSource", json!({"source_uuid": "cam"})), json!(true));
}

#[test]
fn test_source_frame_callback_methods() {
    let bridge = bridge();
    let created = bridge.dispatch(
        "createSource",
        json!({"source_uuid": "c1", "kind": "generic", "source_id": "color_source"}),
    );
    assert_eq!(created, json!(true));
    assert_eq!(
        bridge.dispatch("addSourceFrameCallback", json!({"source_uuid": "c1"})),
        json!(true)
    );
    assert_eq!(
        bridge.dispatch("removeSourceFrameCallback", json!({"source_uuid": "c1"})),
        json!(true)
    );
    assert_eq!(bridge.dispatch("addSourceFrameCallback", json!({})), json!(false));
    assert_eq!(
        bridge.dispatch("removeSourceFrameCallback", json!({"source_uuid": "nope"})),
        json!(false)
    );
}

#[test]
fn test_play_pause_needs_pause_argument() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("clip.mp4");
    std::fs::write(&file, b"").unwrap();
    let bridge = bridge();
    bridge.dispatch(
        "createMediaSource",
        json!({"source_uuid": "src1", "local_file": file.to_string_lossy()}),
    );

    assert_eq!(
        bridge.dispatch("mediaPlayPause", json!({"source_uuid": "src1"})),
        json!(false)
    );
    assert_eq!(
        bridge.dispatch("mediaGetState", json!({"source_uuid": "src1"})),
        json!(MediaState::Stopped.code())
    );
}

#[test]
fn test_enumeration_methods() {
    let bridge = bridge();
    let video = bridge.dispatch("getVideoInputs", Value::Null);
    assert_eq!(video.as_array().unwrap().len(), 2);
    assert_eq!(video[0]["id"], json!("test-pattern-0"));

    let audio = bridge.dispatch("getInputsFromType", json!({"type_id": "audio_capture"}));
    assert_eq!(audio, bridge.dispatch("getAudioInputs", Value::Null));

    let types = bridge.dispatch("getInputTypes", Value::Null);
    assert!(types.as_array().unwrap().iter().any(|t| t["id"] == json!("media_source")));
}

#[test]
fn test_stream_and_volume_methods() {
    let bridge = bridge();
    assert_eq!(bridge.dispatch("startStopStream", json!({"start": true})), json!(true));
    bridge.output().wait_settled(std::time::Duration::from_secs(5));
    assert_eq!(bridge.dispatch("outputGetState", Value::Null), json!(2));
    assert_eq!(bridge.dispatch("startStopStream", json!({"start": false})), json!(true));
    assert_eq!(bridge.dispatch("startStopStream", json!({})), json!(false));

    assert_eq!(
        bridge.dispatch(
            "createAudioSource",
            json!({"source_uuid": "mic", "device_uid": "tone-0"})
        ),
        json!(true)
    );
    let token = bridge.dispatch("addVolumeMeterCallback", json!({"source_uuid": "mic"}));
    assert!(token.as_i64().unwrap() > 0);
    assert_eq!(
        bridge.dispatch("removeVolumeMeterCallback", json!({"token": token})),
        json!(true)
    );
}

#[test]
fn test_video_settings_methods() {
    let bridge = bridge();
    assert_eq!(
        bridge.dispatch("changeFrameRate", json!({"numerator": 60, "denominator": 1})),
        json!(true)
    );
    assert_eq!(
        bridge.dispatch(
            "changeResolution",
            json!({"base_width": 1920, "base_height": 1080, "output_width": 1280, "output_height": 720})
        ),
        json!(true)
    );
    let settings = bridge.video_settings();
    assert_eq!((settings.fps_num, settings.base_width), (60, 1920));

    assert_eq!(
        bridge.dispatch("changeFrameRate", json!({"numerator": 0, "denominator": 1})),
        json!(false)
    );
    assert_eq!(bridge.video_settings().fps_num, 60);
}

#[test]
fn test_unknown_method() {
    let bridge = bridge();
    assert_eq!(bridge.dispatch("frobnicate", json!({"x": 1})), Value::Null);
}

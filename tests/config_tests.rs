// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use scenebridge::constants::{sentinel, video};
use scenebridge::{Config, MediaState, OutputState};

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.video.base_width, video::DEFAULT_BASE_WIDTH);
    assert_eq!(config.video.fps_num, 30);
    assert!(
        !config.software.video_devices.is_empty(),
        "Software engine should offer a video device by default"
    );
}

#[test]
fn test_config_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"video": {"fps_num": 60}}"#).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.video.fps_num, 60);
    assert_eq!(config.video.output_height, video::DEFAULT_OUTPUT_HEIGHT);
    assert_eq!(config.output, Config::default().output);
}

#[test]
fn test_config_save_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let mut config = Config::default();
    config.volume_interval_ms = 25;
    config.save(&path).unwrap();
    assert_eq!(Config::load_or_default(&path), config);
}

#[test]
fn test_state_codes() {
    assert_eq!(MediaState::Playing.code(), 1);
    assert_eq!(MediaState::Ended.code(), 6);
    assert_eq!(MediaState::from_code(sentinel::UNKNOWN_STATE), None);
    assert_eq!(OutputState::Stopped.code(), 0);
    assert_eq!(OutputState::Error.code(), 4);
}

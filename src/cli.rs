// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands over a software engine
//!
//! This module provides command-line functionality for:
//! - Listing input types and devices
//! - Running a short scene/media/stream demo
//! - Issuing single method-channel calls

use scenebridge::constants::input_types;
use scenebridge::{
    Bridge, Config, MediaState, MemoryTextureRegistry, OutputState, SoftwareEngine, SourceKind,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Load the config from `path`, or the default location
pub fn load_config(path: Option<&Path>) -> Config {
    match path.map(Path::to_path_buf).or_else(Config::default_path) {
        Some(path) => Config::load_or_default(&path),
        None => Config::default(),
    }
}

fn start(config: &Config) -> Result<Bridge, Box<dyn std::error::Error>> {
    let engine = Arc::new(SoftwareEngine::new(config.clone()));
    Ok(Bridge::startup(
        engine,
        Arc::new(MemoryTextureRegistry::new()),
        config,
    )?)
}

/// List input types and the devices of each
pub fn list_inputs(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = start(config)?;

    let types = bridge.input_types();
    if types.is_empty() {
        println!("No input types found.");
        return Ok(());
    }

    println!("Input types:");
    println!();
    for input_type in &types {
        println!("  {} ({})", input_type.name, input_type.id);
        for device in bridge.inputs_from_type(&input_type.id) {
            println!("      {} [{}]", device.name, device.id);
        }
    }
    println!();

    Ok(())
}

/// Build one scene, optionally play a media file, stream for `duration` seconds
pub fn run_demo(
    config: &Config,
    media: Option<PathBuf>,
    duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = start(config)?;

    let kind = match &media {
        Some(path) => SourceKind::Media {
            local_file: path.clone(),
            looping: true,
        },
        None => SourceKind::Generic {
            source_id: input_types::COLOR.to_string(),
        },
    };
    let uuid = Uuid::new_v4().to_string();
    let uuid = uuid.as_str();
    let scene_uuid = Uuid::new_v4().to_string();

    if !bridge.create_source(uuid, &kind, "Demo source", true) {
        return Err(format!("Failed to create source {}", uuid).into());
    }
    let texture_id = bridge.register_frame_capture(uuid);
    println!("Source {} -> texture {}", uuid, texture_id);

    bridge.create_scene(&scene_uuid, "Demo");
    let item_id = bridge.add_source(&scene_uuid, uuid);
    println!("Scene item {}", item_id);

    if media.is_some() {
        bridge.media_play_pause(uuid, false);
        println!(
            "Media state: {:?}, duration {} ms",
            MediaState::from_code(bridge.media_get_state(uuid)),
            bridge.media_get_duration(uuid)
        );
    }

    bridge.stream_start();
    let state = bridge.output().wait_settled(Duration::from_secs(5));
    if state != OutputState::Running {
        return Err(format!("Output did not start: {:?}", state).into());
    }
    println!("Streaming for {} seconds...", duration);
    std::thread::sleep(Duration::from_secs(duration));

    bridge.stream_stop();
    bridge.output().wait_settled(Duration::from_secs(5));

    if let Some(stats) = bridge.capture_stats(uuid) {
        println!(
            "Frames: {} delivered, {} dropped, {:.1} fps",
            stats.samples, stats.dropped, stats.fps
        );
    }
    if media.is_some() {
        println!("Media position: {} ms", bridge.media_get_time(uuid));
    }

    Ok(())
}

/// Issue one method-channel call and print the result
pub fn call(config: &Config, method: &str, args: &str) -> Result<(), Box<dyn std::error::Error>> {
    let args: serde_json::Value = serde_json::from_str(args)?;
    let bridge = start(config)?;
    let result = bridge.dispatch(method, args);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

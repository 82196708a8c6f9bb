// SPDX-License-Identifier: GPL-3.0-only

//! scenebridge - control and frame-routing bridge between a UI and a
//! compositing engine
//!
//! A UI layer creates sources and scenes, drives media playback and the
//! streaming output, subscribes to volume meters, and receives decoded video
//! frames as textures. Everything goes through an explicit engine context.
//!
//! # Architecture
//!
//! - [`bridge`]: flat command surface reducing every error to bool/sentinel
//! - [`registry`]: uuid to native handle map shared by every controller
//! - [`scene`], [`media`], [`output`], [`volume`], [`inputs`], [`video`]: controllers
//! - [`capture`]: latest-wins frame sinks and texture registration
//! - [`engine`]: the engine interface and the in-process [`engine::SoftwareEngine`]
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```no_run
//! use scenebridge::{Bridge, Config, MemoryTextureRegistry, SoftwareEngine};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let engine = Arc::new(SoftwareEngine::new(config.clone()));
//! let bridge = Bridge::startup(engine, Arc::new(MemoryTextureRegistry::new()), &config)?;
//! bridge.create_scene("scene-a", "Scene A");
//! # Ok::<(), scenebridge::BridgeError>(())
//! ```

pub mod bridge;
pub mod capture;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod inputs;
pub mod media;
pub mod output;
pub mod registry;
pub mod scene;
pub mod video;
pub mod volume;

// Re-export commonly used types
pub use bridge::Bridge;
pub use capture::{FrameBuffer, MemoryTextureRegistry, PixelFormat, TextureRegistry};
pub use config::{Config, VideoSettings};
pub use engine::{Engine, EngineContext, SoftwareEngine, SourceKind};
pub use errors::{BridgeError, BridgeResult};
pub use media::MediaState;
pub use output::OutputState;
pub use scene::{SceneItemInfo, SceneItemUpdate};
pub use volume::VolumeEvent;

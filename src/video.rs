// SPDX-License-Identifier: GPL-3.0-only

//! Video mixes and video settings
//!
//! A video mix is an engine render of the whole canvas whose frames go to the
//! frame sink registered under the mix's tracking uuid.

use crate::capture::FrameCapture;
use crate::config::VideoSettings;
use crate::engine::EngineContext;
use crate::errors::{BridgeError, BridgeResult};
use crate::output::OutputController;
use crate::registry::HandleRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

pub struct VideoMixer {
    engine: EngineContext,
    registry: Arc<HandleRegistry>,
    capture: Arc<FrameCapture>,
    output: Arc<OutputController>,
    /// Settings last applied to the engine; also serializes resets
    settings: Mutex<VideoSettings>,
}

impl VideoMixer {
    pub fn new(
        engine: EngineContext,
        registry: Arc<HandleRegistry>,
        capture: Arc<FrameCapture>,
        output: Arc<OutputController>,
        settings: VideoSettings,
    ) -> Self {
        Self {
            engine,
            registry,
            capture,
            output,
            settings: Mutex::new(settings),
        }
    }

    pub fn settings(&self) -> VideoSettings {
        *self.settings.lock()
    }

    pub fn add_video_mix(&self, tracking_uuid: &str) -> BridgeResult<()> {
        let _guard = self.settings.lock();
        let output = self.capture.frame_callback(tracking_uuid);
        self.registry.create_video_mix(tracking_uuid, output)?;
        Ok(())
    }

    pub fn remove_video_mix(&self, tracking_uuid: &str) -> BridgeResult<()> {
        let _guard = self.settings.lock();
        self.registry.release_video_mix(tracking_uuid, |_| {})?;
        Ok(())
    }

    pub fn change_framerate(&self, fps_num: u32, fps_den: u32) -> BridgeResult<()> {
        self.reset(|settings| {
            settings.fps_num = fps_num;
            settings.fps_den = fps_den;
        })
    }

    pub fn change_resolution(
        &self,
        base_width: u32,
        base_height: u32,
        output_width: u32,
        output_height: u32,
    ) -> BridgeResult<()> {
        self.reset(|settings| {
            settings.base_width = base_width;
            settings.base_height = base_height;
            settings.output_width = output_width;
            settings.output_height = output_height;
        })
    }

    /// Apply modified settings to the engine
    ///
    /// Video mixes are detached for the reset and re-attached afterwards,
    /// whether or not the reset succeeded.
    fn reset(&self, modify: impl FnOnce(&mut VideoSettings)) -> BridgeResult<()> {
        let mut settings = self.settings.lock();
        if self.output.get_state().is_active() {
            return Err(BridgeError::invalid_transition(
                "video settings cannot change while the output is active",
            ));
        }

        let mut next = *settings;
        modify(&mut next);
        next.validate()?;

        let mixes = self.registry.video_mixes();
        for (_, handle) in &mixes {
            self.engine.remove_video_mix(*handle);
        }

        let result = self.engine.reset_video(&next);

        for (uuid, _) in &mixes {
            let reattached = self
                .engine
                .add_video_mix(self.capture.frame_callback(uuid))
                .and_then(|handle| self.registry.rebind(uuid, handle));
            if let Err(e) = reattached {
                warn!(uuid = %uuid, error = %e, "Failed to re-attach video mix");
            }
        }

        result?;
        *settings = next;
        info!(
            base_width = next.base_width,
            base_height = next.base_height,
            output_width = next.output_width,
            output_height = next.output_height,
            fps_num = next.fps_num,
            fps_den = next.fps_den,
            mixes = mixes.len(),
            "Video settings changed"
        );
        Ok(())
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Device and input enumeration

use crate::constants::input_types;
use crate::engine::{EngineContext, InputDescriptor};
use tracing::debug;

/// Side-effect-free queries for input kinds and devices
///
/// Results are returned in engine order; nothing available is an empty list.
pub struct InputEnumerator {
    engine: EngineContext,
}

impl InputEnumerator {
    pub fn new(engine: EngineContext) -> Self {
        Self { engine }
    }

    pub fn input_types(&self) -> Vec<InputDescriptor> {
        let types = self.engine.input_types();
        debug!(count = types.len(), "Enumerated input types");
        types
    }

    pub fn audio_inputs(&self) -> Vec<InputDescriptor> {
        self.inputs_from_type(input_types::AUDIO_CAPTURE)
    }

    pub fn video_inputs(&self) -> Vec<InputDescriptor> {
        self.inputs_from_type(input_types::VIDEO_CAPTURE)
    }

    pub fn inputs_from_type(&self, type_id: &str) -> Vec<InputDescriptor> {
        let inputs = self.engine.inputs_from_type(type_id);
        debug!(type_id = %type_id, count = inputs.len(), "Enumerated inputs");
        inputs
    }
}

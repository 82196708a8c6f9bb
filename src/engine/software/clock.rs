// SPDX-License-Identifier: GPL-3.0-only

//! Simulated media playback clock

use crate::engine::NativeMediaStatus;
use crate::errors::{BridgeError, BridgeResult};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
enum ClockState {
    Stopped,
    Playing { since: Instant, from_ms: u64 },
    Paused { at_ms: u64 },
    Ended,
    Fault(String),
}

/// Wall-clock driven playback position of one media source
#[derive(Debug, Clone)]
pub struct MediaClock {
    duration_ms: u64,
    looping: bool,
    state: ClockState,
}

impl MediaClock {
    pub fn new(duration_ms: u64, looping: bool) -> Self {
        Self {
            duration_ms,
            looping,
            state: ClockState::Stopped,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Fold elapsed time into the state: a non-looping clock that ran past
    /// the end becomes `Ended`
    fn settle(&mut self, now: Instant) {
        if let ClockState::Playing { since, from_ms } = self.state {
            let position = from_ms + now.saturating_duration_since(since).as_millis() as u64;
            if position >= self.duration_ms && !self.looping {
                self.state = ClockState::Ended;
            }
        }
    }

    pub fn status(&mut self) -> NativeMediaStatus {
        self.settle(Instant::now());
        match &self.state {
            ClockState::Stopped => NativeMediaStatus::Stopped,
            ClockState::Playing { .. } => NativeMediaStatus::Playing,
            ClockState::Paused { .. } => NativeMediaStatus::Paused,
            ClockState::Ended => NativeMediaStatus::Ended,
            ClockState::Fault(msg) => NativeMediaStatus::Fault(msg.clone()),
        }
    }

    pub fn is_playing(&mut self) -> bool {
        self.status() == NativeMediaStatus::Playing
    }

    pub fn time_ms(&mut self) -> u64 {
        let now = Instant::now();
        self.settle(now);
        match self.state {
            ClockState::Playing { since, from_ms } => {
                let position = from_ms + now.saturating_duration_since(since).as_millis() as u64;
                if self.duration_ms == 0 {
                    0
                } else if self.looping {
                    position % self.duration_ms
                } else {
                    position.min(self.duration_ms)
                }
            }
            ClockState::Paused { at_ms } => at_ms,
            ClockState::Ended => self.duration_ms,
            ClockState::Stopped | ClockState::Fault(_) => 0,
        }
    }

    pub fn play(&mut self, from_ms: u64) {
        self.state = ClockState::Playing {
            since: Instant::now(),
            from_ms: from_ms.min(self.duration_ms),
        };
    }

    pub fn pause(&mut self) -> BridgeResult<()> {
        let at_ms = self.time_ms();
        match self.state {
            ClockState::Playing { .. } => {
                self.state = ClockState::Paused { at_ms };
                Ok(())
            }
            _ => Err(BridgeError::invalid_transition("pause while not playing")),
        }
    }

    pub fn resume(&mut self) -> BridgeResult<()> {
        match self.state {
            ClockState::Paused { at_ms } => {
                self.play(at_ms);
                Ok(())
            }
            _ => Err(BridgeError::invalid_transition("resume while not paused")),
        }
    }

    pub fn seek(&mut self, ms: u64) -> BridgeResult<()> {
        let ms = ms.min(self.duration_ms);
        self.settle(Instant::now());
        match self.state {
            ClockState::Playing { .. } => {
                self.play(ms);
                Ok(())
            }
            ClockState::Paused { .. } => {
                self.state = ClockState::Paused { at_ms: ms };
                Ok(())
            }
            _ => Err(BridgeError::invalid_transition("seek while not playing or paused")),
        }
    }

    /// Stop and rewind; also clears a fault
    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    pub fn fault(&mut self, msg: impl Into<String>) {
        self.state = ClockState::Fault(msg.into());
    }
}

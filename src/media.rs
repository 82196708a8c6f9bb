// SPDX-License-Identifier: GPL-3.0-only

//! Media playback controller
//!
//! One state machine per media source:
//!
//! ```text
//! Stopped ──play──► Playing ◄──play/pause──► Paused
//!    ▲                 │
//!    │                 └──(end of file)──► Ended ──play──► Playing
//!    └──────stop (from any state, including Error)
//! ```
//!
//! `Error` is entered whenever the engine reports a fault and is left only
//! through `stop` (or `restart`, which stops first). Players are created
//! lazily on the first command for a uuid and forgotten when the source is
//! released.

use crate::engine::{EngineContext, NativeHandle, NativeMediaStatus};
use crate::errors::{BridgeError, BridgeResult};
use crate::registry::HandleRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Playback state of a media source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaState {
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

impl MediaState {
    /// Numeric code used on the command surface
    ///
    /// Codes follow the engine's media state numbering; 0 means unknown.
    pub fn code(self) -> i32 {
        match self {
            MediaState::Playing => 1,
            MediaState::Paused => 4,
            MediaState::Stopped => 5,
            MediaState::Ended => 6,
            MediaState::Error => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(MediaState::Playing),
            4 => Some(MediaState::Paused),
            5 => Some(MediaState::Stopped),
            6 => Some(MediaState::Ended),
            7 => Some(MediaState::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaState::Playing => "playing",
            MediaState::Paused => "paused",
            MediaState::Stopped => "stopped",
            MediaState::Ended => "ended",
            MediaState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Player {
    handle: NativeHandle,
    state: MediaState,
    /// Position set while stopped or ended, used by the next play
    start_offset_ms: Option<u64>,
}

/// Media playback controller
pub struct MediaController {
    engine: EngineContext,
    registry: Arc<HandleRegistry>,
    players: Mutex<HashMap<String, Player>>,
}

impl MediaController {
    pub fn new(engine: EngineContext, registry: Arc<HandleRegistry>) -> Self {
        Self {
            engine,
            registry,
            players: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `uuid` to a media source and run `op` on its player
    ///
    /// The players lock is held for the whole operation so commands on one
    /// source are applied in order.
    fn with_player<T>(
        &self,
        uuid: &str,
        op: impl FnOnce(&EngineContext, &mut Player) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        let (handle, kind) = self.registry.lookup_source(uuid)?;
        if !kind.is_media() {
            return Err(BridgeError::not_found(format!("media source {}", uuid)));
        }

        let mut players = self.players.lock();
        let player = players.entry(uuid.to_string()).or_insert_with(|| Player {
            handle,
            state: MediaState::Stopped,
            start_offset_ms: None,
        });
        // A uuid re-created after release gets a fresh player
        if player.handle != handle {
            *player = Player {
                handle,
                state: MediaState::Stopped,
                start_offset_ms: None,
            };
        }

        Self::sync(&self.engine, uuid, player);
        let result = op(&self.engine, player);
        if let Err(BridgeError::EngineFault(msg)) = &result {
            warn!(uuid = %uuid, error = %msg, "Media engine fault");
            player.state = MediaState::Error;
        }
        result
    }

    /// Fold asynchronous engine transitions (end of file, faults) into the state
    fn sync(engine: &EngineContext, uuid: &str, player: &mut Player) {
        let status = match engine.media_status(player.handle) {
            Ok(status) => status,
            Err(e) => {
                debug!(uuid = %uuid, error = %e, "Media status unavailable");
                return;
            }
        };
        let next = match (player.state, status) {
            (MediaState::Error, _) => MediaState::Error,
            (_, NativeMediaStatus::Fault(msg)) => {
                warn!(uuid = %uuid, error = %msg, "Media source faulted");
                MediaState::Error
            }
            (MediaState::Playing, NativeMediaStatus::Ended) => MediaState::Ended,
            (state, _) => state,
        };
        if next != player.state {
            info!(uuid = %uuid, from = %player.state, to = %next, "Media state changed");
            player.state = next;
        }
    }

    fn start(engine: &EngineContext, player: &mut Player) -> BridgeResult<()> {
        let from = player.start_offset_ms.take().unwrap_or(0);
        engine.media_play(player.handle, from)?;
        player.state = MediaState::Playing;
        Ok(())
    }

    /// Play (`pause = false`) or pause (`pause = true`)
    ///
    /// Requesting the state the source is already in is a no-op.
    pub fn play_pause(&self, uuid: &str, pause: bool) -> BridgeResult<()> {
        self.with_player(uuid, |engine, player| {
            match (player.state, pause) {
                (MediaState::Playing, false) | (MediaState::Paused, true) => return Ok(()),
                (MediaState::Stopped | MediaState::Ended, false) => Self::start(engine, player)?,
                (MediaState::Paused, false) => {
                    engine.media_resume(player.handle)?;
                    player.state = MediaState::Playing;
                }
                (MediaState::Playing, true) => {
                    engine.media_pause(player.handle)?;
                    player.state = MediaState::Paused;
                }
                (state @ (MediaState::Stopped | MediaState::Ended), true) => {
                    return Err(BridgeError::invalid_transition(format!(
                        "pause while {}",
                        state
                    )));
                }
                (MediaState::Error, _) => {
                    return Err(BridgeError::invalid_transition("source is in error; stop it first"));
                }
            }
            info!(uuid = %uuid, state = %player.state, "Media state changed");
            Ok(())
        })
    }

    /// Stop and rewind to zero. Valid from every state.
    pub fn stop(&self, uuid: &str) -> BridgeResult<()> {
        self.with_player(uuid, |engine, player| {
            engine.media_stop(player.handle)?;
            player.state = MediaState::Stopped;
            player.start_offset_ms = None;
            info!(uuid = %uuid, "Media stopped");
            Ok(())
        })
    }

    /// Stop, then play from the beginning
    pub fn restart(&self, uuid: &str) -> BridgeResult<()> {
        self.with_player(uuid, |engine, player| {
            engine.media_stop(player.handle)?;
            player.state = MediaState::Stopped;
            player.start_offset_ms = None;
            Self::start(engine, player)?;
            info!(uuid = %uuid, "Media restarted");
            Ok(())
        })
    }

    pub fn get_duration(&self, uuid: &str) -> BridgeResult<u64> {
        self.with_player(uuid, |engine, player| engine.media_duration(player.handle))
    }

    /// Current position; while stopped, the offset the next play starts from
    pub fn get_time(&self, uuid: &str) -> BridgeResult<u64> {
        self.with_player(uuid, |engine, player| match player.state {
            MediaState::Stopped => Ok(player.start_offset_ms.unwrap_or(0)),
            MediaState::Ended if player.start_offset_ms.is_some() => {
                Ok(player.start_offset_ms.unwrap_or(0))
            }
            _ => engine.media_time(player.handle),
        })
    }

    /// Seek, clamped to `[0, duration]`
    ///
    /// While stopped or ended the position is recorded for the next play.
    pub fn set_time(&self, uuid: &str, ms: i64) -> BridgeResult<()> {
        self.with_player(uuid, |engine, player| {
            let duration = engine.media_duration(player.handle)?;
            if duration == 0 {
                return Err(BridgeError::invalid_transition("source is not seekable"));
            }
            let ms = (ms.max(0) as u64).min(duration);
            match player.state {
                MediaState::Stopped | MediaState::Ended => player.start_offset_ms = Some(ms),
                MediaState::Playing | MediaState::Paused => engine.media_seek(player.handle, ms)?,
                MediaState::Error => {
                    return Err(BridgeError::invalid_transition("seek while in error"));
                }
            }
            debug!(uuid = %uuid, ms, "Media position set");
            Ok(())
        })
    }

    pub fn get_state(&self, uuid: &str) -> BridgeResult<MediaState> {
        self.with_player(uuid, |_, player| Ok(player.state))
    }

    /// Drop the player of a released source
    pub fn forget(&self, uuid: &str) {
        self.players.lock().remove(uuid);
    }
}

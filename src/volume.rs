// SPDX-License-Identifier: GPL-3.0-only

//! Volume meter bridge
//!
//! Each meter is identified by a positive token. Engine meter callbacks run on
//! engine threads; they only forward levels to the subscriber channels and
//! never touch the handle registry.

use crate::engine::{EngineContext, NativeHandle, VolumeLevels};
use crate::errors::{BridgeError, BridgeResult};
use crate::registry::HandleRegistry;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{debug, info, trace};

/// One level sample forwarded to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeEvent {
    pub source_uuid: String,
    pub token: i64,
    #[serde(flatten)]
    pub levels: VolumeLevels,
}

struct Meter {
    source_uuid: String,
    native: NativeHandle,
    channels: usize,
    /// Cleared on removal; samples already in flight are then discarded
    live: Arc<AtomicBool>,
}

type Subscribers = Arc<Mutex<Vec<UnboundedSender<VolumeEvent>>>>;

pub struct VolumeBridge {
    engine: EngineContext,
    registry: Arc<HandleRegistry>,
    next_token: AtomicI64,
    meters: Mutex<HashMap<i64, Meter>>,
    subscribers: Subscribers,
}

impl VolumeBridge {
    pub fn new(engine: EngineContext, registry: Arc<HandleRegistry>) -> Self {
        Self {
            engine,
            registry,
            next_token: AtomicI64::new(1),
            meters: Mutex::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Stream of level samples from every meter
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> UnboundedReceiver<VolumeEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Attach a meter to a source, returning its token
    pub fn add_callback(&self, source_uuid: &str) -> BridgeResult<i64> {
        let (handle, _) = self.registry.lookup_source(source_uuid)?;
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let live = Arc::new(AtomicBool::new(true));

        let callback = {
            let live = Arc::clone(&live);
            let subscribers = Arc::clone(&self.subscribers);
            let source_uuid = source_uuid.to_string();
            Arc::new(move |levels: VolumeLevels| {
                if !live.load(Ordering::Acquire) {
                    return;
                }
                let event = VolumeEvent {
                    source_uuid: source_uuid.clone(),
                    token,
                    levels,
                };
                trace!(token, "Volume sample");
                // Closed receivers are pruned
                subscribers
                    .lock()
                    .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
            })
        };

        let (native, channels) = self.engine.add_volmeter(handle, callback)?;
        self.meters.lock().insert(
            token,
            Meter {
                source_uuid: source_uuid.to_string(),
                native,
                channels,
                live,
            },
        );

        // The source may have been released while the meter was being attached
        if !self.registry.contains(source_uuid) {
            self.remove_source(source_uuid);
            return Err(BridgeError::not_found(format!("source {}", source_uuid)));
        }

        info!(source = %source_uuid, token, channels, "Volume meter added");
        Ok(token)
    }

    pub fn remove_callback(&self, token: i64) -> BridgeResult<()> {
        let meter = self
            .meters
            .lock()
            .remove(&token)
            .ok_or_else(|| BridgeError::not_found(format!("volume meter {}", token)))?;
        meter.live.store(false, Ordering::Release);
        self.engine.remove_volmeter(meter.native);
        info!(source = %meter.source_uuid, token, "Volume meter removed");
        Ok(())
    }

    /// Remove every meter of a released source, returning how many were removed
    pub fn remove_source(&self, source_uuid: &str) -> usize {
        let removed: Vec<(i64, Meter)> = {
            let mut meters = self.meters.lock();
            let tokens: Vec<i64> = meters
                .iter()
                .filter(|(_, m)| m.source_uuid == source_uuid)
                .map(|(token, _)| *token)
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| meters.remove(&token).map(|m| (token, m)))
                .collect()
        };
        for (token, meter) in &removed {
            meter.live.store(false, Ordering::Release);
            self.engine.remove_volmeter(meter.native);
            debug!(source = %source_uuid, token, "Volume meter released with source");
        }
        removed.len()
    }

    /// Tokens of the meters attached to a source
    pub fn tokens(&self, source_uuid: &str) -> Vec<i64> {
        let mut tokens: Vec<i64> = self
            .meters
            .lock()
            .iter()
            .filter(|(_, m)| m.source_uuid == source_uuid)
            .map(|(token, _)| *token)
            .collect();
        tokens.sort_unstable();
        tokens
    }

    /// Channel count sampled by a meter
    pub fn channels(&self, token: i64) -> Option<usize> {
        self.meters.lock().get(&token).map(|m| m.channels)
    }
}

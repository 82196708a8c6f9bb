// SPDX-License-Identifier: GPL-3.0-only

//! Streaming output controller
//!
//! Global state machine of the compositor's output mix:
//!
//! ```text
//! Stopped ──start──► Starting ──(engine: started)──► Running
//!    ▲                  │                               │
//!    │                  └──(engine: failed)──► Error ◄──┘
//!    │                                          │
//!    └──(engine: stopped)── Stopping ◄──stop── Running
//! ```
//!
//! Commands return as soon as the transition has begun. Completion arrives as
//! an [`OutputEvent`] on an engine thread; events that do not match the
//! current transient state are stale and ignored.

use crate::engine::{EngineContext, OutputEvent};
use crate::errors::{BridgeError, BridgeResult};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Output mix state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl OutputState {
    /// Numeric code used on the command surface
    pub fn code(self) -> i32 {
        match self {
            OutputState::Stopped => 0,
            OutputState::Starting => 1,
            OutputState::Running => 2,
            OutputState::Stopping => 3,
            OutputState::Error => 4,
        }
    }

    /// Output is starting, running or stopping
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OutputState::Starting | OutputState::Running | OutputState::Stopping
        )
    }
}

#[derive(Debug)]
struct Shared {
    state: OutputState,
    last_error: Option<String>,
}

#[derive(Debug)]
struct Inner {
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl Inner {
    fn set(&self, shared: &mut Shared, next: OutputState) {
        if shared.state != next {
            info!(from = ?shared.state, to = ?next, "Output state changed");
            shared.state = next;
            self.changed.notify_all();
        }
    }

    fn on_event(&self, event: OutputEvent) {
        let mut shared = self.shared.lock();
        match (shared.state, event) {
            (OutputState::Starting, OutputEvent::Started) => {
                self.set(&mut shared, OutputState::Running)
            }
            (OutputState::Stopping, OutputEvent::Stopped) => {
                self.set(&mut shared, OutputState::Stopped)
            }
            (OutputState::Starting | OutputState::Running, OutputEvent::Failed(msg)) => {
                warn!(error = %msg, "Output failed");
                shared.last_error = Some(msg);
                self.set(&mut shared, OutputState::Error);
            }
            (state, event) => debug!(?state, ?event, "Ignoring stale output event"),
        }
    }
}

/// Streaming output controller
pub struct OutputController {
    engine: EngineContext,
    inner: Arc<Inner>,
}

impl OutputController {
    /// Create the controller and install it as the engine's output listener
    pub fn new(engine: EngineContext) -> Self {
        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                state: OutputState::Stopped,
                last_error: None,
            }),
            changed: Condvar::new(),
        });
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        engine.set_output_listener(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_event(event);
            }
        }));
        Self { engine, inner }
    }

    /// Begin starting the output
    ///
    /// A no-op while already Starting or Running. Retrying from Error is allowed.
    pub fn start(&self) -> BridgeResult<()> {
        {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                OutputState::Starting | OutputState::Running => return Ok(()),
                OutputState::Stopping => {
                    return Err(BridgeError::invalid_transition("start while stopping"));
                }
                OutputState::Stopped | OutputState::Error => {
                    shared.last_error = None;
                    self.inner.set(&mut shared, OutputState::Starting);
                }
            }
        }
        // Lock released: the engine may report completion from another thread
        self.engine.output_start().inspect_err(|e| self.fail(e))
    }

    /// Begin stopping the output
    ///
    /// A no-op while already Stopping or Stopped. From Error the output is
    /// already down and goes straight to Stopped.
    pub fn stop(&self) -> BridgeResult<()> {
        {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                OutputState::Stopped | OutputState::Stopping => return Ok(()),
                OutputState::Starting => {
                    return Err(BridgeError::invalid_transition("stop while starting"));
                }
                OutputState::Error => {
                    self.inner.set(&mut shared, OutputState::Stopped);
                    return Ok(());
                }
                OutputState::Running => self.inner.set(&mut shared, OutputState::Stopping),
            }
        }
        self.engine.output_stop().inspect_err(|e| self.fail(e))
    }

    /// Stop the output from any state, superseding a start in flight
    ///
    /// Used on shutdown, where nothing could stop the output later.
    pub fn force_stop(&self) -> BridgeResult<()> {
        {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                OutputState::Stopped | OutputState::Stopping => return Ok(()),
                OutputState::Error => {
                    self.inner.set(&mut shared, OutputState::Stopped);
                    return Ok(());
                }
                OutputState::Starting | OutputState::Running => {
                    self.inner.set(&mut shared, OutputState::Stopping)
                }
            }
        }
        self.engine.output_stop().inspect_err(|e| self.fail(e))
    }

    fn fail(&self, error: &BridgeError) {
        let mut shared = self.inner.shared.lock();
        shared.last_error = Some(error.to_string());
        self.inner.set(&mut shared, OutputState::Error);
    }

    pub fn get_state(&self) -> OutputState {
        self.inner.shared.lock().state
    }

    /// Message of the failure that put the output into Error
    pub fn last_error(&self) -> Option<String> {
        self.inner.shared.lock().last_error.clone()
    }

    /// Block until the output settles into a state other than Starting or
    /// Stopping, or `timeout` elapses. Returns the state observed last.
    pub fn wait_settled(&self, timeout: Duration) -> OutputState {
        let deadline = Instant::now() + timeout;
        let mut shared = self.inner.shared.lock();
        while matches!(shared.state, OutputState::Starting | OutputState::Stopping) {
            if self.inner.changed.wait_until(&mut shared, deadline).timed_out() {
                break;
            }
        }
        shared.state
    }
}

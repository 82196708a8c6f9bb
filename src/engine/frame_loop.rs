// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for producer loops
//!
//! Engines run one producer thread per frame-producing source (and one per
//! volume meter). This module gives them a single way to start, pace, and stop
//! those threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Controller for a producer loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let controller = CaptureLoopController::start_paced("bars", interval, move || {
///     output(render_pattern());
/// });
///
/// // Later, stop the loop
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl CaptureLoopController {
    /// Start a loop that runs `loop_fn` once per `interval` until `stop()`
    ///
    /// The wait between iterations is a park, so `stop()` wakes the thread
    /// immediately instead of waiting out the interval.
    pub fn start_paced<F>(name: &str, interval: Duration, mut loop_fn: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, ?interval, "Starting producer loop");

        let thread_handle = thread::Builder::new()
            .name(format!("producer-{}", name))
            .spawn(move || {
                debug!(name = %name_clone, "Producer loop thread started");
                let mut next_tick = Instant::now();

                loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    loop_fn();

                    next_tick += interval;
                    // Parks can wake spuriously; re-check the deadline
                    loop {
                        if stop_signal_clone.load(Ordering::SeqCst) {
                            break;
                        }
                        let now = Instant::now();
                        if now >= next_tick {
                            break;
                        }
                        thread::park_timeout(next_tick - now);
                    }
                    // Fell behind by more than a frame: resync instead of bursting
                    let now = Instant::now();
                    if now > next_tick + interval {
                        next_tick = now;
                    }
                }

                info!(name = %name_clone, "Producer loop thread exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn producer thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting producer loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = &self.thread_handle {
            handle.thread().unpark();
        }
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // A loop releasing its own source cannot join itself
                debug!(name = %self.name, "Producer loop stopped from its own thread");
                return;
            }
            debug!(name = %self.name, "Waiting for producer loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Producer loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Producer loop thread finished");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

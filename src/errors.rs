// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the bridge
//!
//! Every internal API returns [`BridgeResult`]. Errors never cross the command
//! surface: [`crate::bridge::Bridge`] reduces them to `false` or a sentinel value
//! and logs the message.

use std::fmt;

/// Result type alias using BridgeError
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error taxonomy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// UUID, handle, texture or scene item could not be resolved
    NotFound(String),
    /// Create was called with an identifier that is already live
    DuplicateUuid(String),
    /// The requested transition is not defined from the current state
    InvalidStateTransition(String),
    /// A native device could not be opened (missing, busy, unreadable file)
    DeviceUnavailable(String),
    /// Kind or feature not implemented by the engine
    Unsupported(String),
    /// Unexpected native failure
    EngineFault(String),
    /// Engine startup failed or was never attempted
    EngineNotStarted,
    /// Configuration could not be loaded or saved
    Config(String),
}

impl BridgeError {
    /// Build a [`BridgeError::NotFound`] value.
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Build a [`BridgeError::InvalidStateTransition`] value.
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    /// Build a [`BridgeError::EngineFault`] value.
    pub fn engine_fault(msg: impl Into<String>) -> Self {
        Self::EngineFault(msg.into())
    }

    /// Short machine-readable name, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NotFound(_) => "not_found",
            BridgeError::DuplicateUuid(_) => "duplicate_uuid",
            BridgeError::InvalidStateTransition(_) => "invalid_state_transition",
            BridgeError::DeviceUnavailable(_) => "device_unavailable",
            BridgeError::Unsupported(_) => "unsupported",
            BridgeError::EngineFault(_) => "engine_fault",
            BridgeError::EngineNotStarted => "engine_not_started",
            BridgeError::Config(_) => "config",
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::NotFound(what) => write!(f, "Not found: {}", what),
            BridgeError::DuplicateUuid(uuid) => write!(f, "Identifier already in use: {}", uuid),
            BridgeError::InvalidStateTransition(msg) => {
                write!(f, "Invalid state transition: {}", msg)
            }
            BridgeError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            BridgeError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            BridgeError::EngineFault(msg) => write!(f, "Engine fault: {}", msg),
            BridgeError::EngineNotStarted => write!(f, "Engine is not started"),
            BridgeError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

// Conversions for the config layer
impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

//! Error types for MIDI access, decoding, and the device session

use thiserror::Error;

/// Failure to obtain MIDI access. Both variants end the session in the
/// permission-error state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("MIDI access was denied by the user or platform")]
    PermissionDenied,

    #[error("MIDI access unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty MIDI message")]
    Empty,

    #[error("malformed MIDI message: status {status:#04X} needs 3 bytes, got {len}")]
    MalformedMessage { status: u8, len: usize },
}

/// Errors raised by a platform backend while registering listeners
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("MIDI input port '{0}' not found")]
    PortNotFound(String),

    #[error("MIDI init error: {0}")]
    Init(String),

    #[error("failed to connect to MIDI input '{port}': {reason}")]
    Connect { port: String, reason: String },
}

impl From<midir::InitError> for PlatformError {
    fn from(e: midir::InitError) -> Self {
        PlatformError::Init(e.to_string())
    }
}

/// Errors returned to callers of the session handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("MIDI session is not loaded")]
    NotLoaded,

    #[error("MIDI device '{0}' is not connected")]
    DeviceUnavailable(String),

    #[error("MIDI session has stopped")]
    Stopped,
}

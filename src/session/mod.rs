//! MIDI session state machine
//!
//! [`SessionHandle::spawn`] starts the orchestrating actor, which acquires
//! MIDI access and, once loaded, runs exactly one [`DeviceSession`] that
//! tracks inputs, hot-plug changes and the selected device.

mod actor;
mod commands;
pub mod device;
mod handle;


pub use actor::SessionActor;
pub use device::{DeviceEvent, DeviceSession, DeviceSessionContext};
pub use handle::SessionHandle;

use crate::error::AccessError;
use crate::midi::MidiEvent;

/// Capacity of the decoded event stream. Events arriving while it is full
/// are dropped, so an untaken receiver never grows.
pub const EVENT_BUFFER: usize = 1024;

/// Top-level session state for conditional rendering
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Permission or access request in flight
    Loading,
    /// Access granted, device session listening
    Loaded(DeviceSessionContext),
    /// Access refused or unavailable; no automatic retry
    PermissionError(AccessError),
    /// Session halted; every listener has been released
    Stopped,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, SessionState::Loaded(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    pub fn permission_error(&self) -> Option<&AccessError> {
        match self {
            SessionState::PermissionError(error) => Some(error),
            _ => None,
        }
    }
}

/// Device selection performed when a session loads
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Select the first connected input when no preferred pattern is set
    pub auto_select: bool,
    /// Case-insensitive substring of the input name to select
    pub preferred_device: Option<String>,
}

/// Decoded event tagged with the input it arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub device_id: String,
    pub event: MidiEvent,
}

//! Platform MIDI access boundary
//!
//! The session only talks to MIDI hardware through [`MidiAccess`] and
//! [`AccessHandle`]. Every listener registration returns a [`Subscription`]
//! that unregisters the listener when released.

pub mod midir_backend;
mod subscription;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AccessError, PlatformError};

pub use midir_backend::MidirAccess;
pub use subscription::Subscription;

/// Outcome of the platform permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Prompt,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// MIDI input device as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDeviceDescriptor {
    /// Stable identifier, unique per physical port
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub state: ConnectionState,
}

impl MidiDeviceDescriptor {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Hot-plug notification; `port` is None when the platform could not
/// describe the port that changed.
#[derive(Debug, Clone)]
pub struct PortNotification {
    pub port: Option<MidiDeviceDescriptor>,
}

/// Callback invoked for each hot-plug notification
pub type HotplugCallback = Box<dyn Fn(PortNotification) + Send + Sync>;

/// Callback invoked with the raw bytes of each incoming message
pub type MessageCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Entry point of a MIDI platform: permission and access acquisition
#[async_trait]
pub trait MidiAccess: Send + Sync {
    async fn query_permission(&self) -> PermissionStatus;

    async fn request_access(&self) -> Result<Arc<dyn AccessHandle>, AccessError>;
}

/// Granted MIDI access: port enumeration and listener registration
pub trait AccessHandle: Send + Sync {
    /// Currently enumerated input ports
    fn list_inputs(&self) -> Vec<MidiDeviceDescriptor>;

    /// Register for hot-plug notifications
    fn subscribe_hotplug(&self, callback: HotplugCallback) -> Subscription;

    /// Register for raw messages arriving on one input port
    fn subscribe_messages(
        &self,
        port_id: &str,
        callback: MessageCallback,
    ) -> Result<Subscription, PlatformError>;
}

//! Device session: the listening state of a loaded MIDI session
//!
//! Entering the state registers a hot-plug listener and one message listener
//! per connected input port. All of them are released together when the
//! session exits, whether through [`DeviceSession::exit`] or by being dropped.
//! Platform callbacks never touch the session directly; they enqueue
//! [`SessionCommand`]s for the owning actor, behind a gate that closes before
//! any listener is released.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::{debug, info, trace, warn};

use super::commands::SessionCommand;
use crate::error::SessionError;
use crate::midi::{self, format_hex, MidiEvent};
use crate::platform::{
    AccessHandle, ConnectionState, MidiDeviceDescriptor, PortNotification, Subscription,
};

/// Context of a loaded session
#[derive(Clone)]
pub struct DeviceSessionContext {
    pub access: Arc<dyn AccessHandle>,
    /// Selected input; referenced a connected device when it was set
    pub selected_device_id: Option<String>,
}

impl fmt::Debug for DeviceSessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSessionContext")
            .field("selected_device_id", &self.selected_device_id)
            .finish_non_exhaustive()
    }
}

/// Events the device session reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    SelectDevice(String),
    DeselectDevice,
    DevicePortConnected(MidiDeviceDescriptor),
    DevicePortDisconnected(MidiDeviceDescriptor),
}

impl DeviceEvent {
    /// Map a hot-plug notification to a device event by the port's reported
    /// connection state. Notifications without a port are dropped.
    pub fn from_notification(notification: PortNotification) -> Option<Self> {
        let port = notification.port?;
        Some(match port.state {
            ConnectionState::Connected => DeviceEvent::DevicePortConnected(port),
            ConnectionState::Disconnected => DeviceEvent::DevicePortDisconnected(port),
        })
    }
}

/// What a handled event changed, so the owner knows what to republish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub devices: bool,
    pub selection: bool,
}

/// Shared open/closed flag checked by every registered callback
#[derive(Clone)]
struct Gate(Arc<AtomicBool>);

impl Gate {
    fn open() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Listening device session
pub struct DeviceSession {
    context: DeviceSessionContext,
    devices: Vec<MidiDeviceDescriptor>,
    commands: WeakUnboundedSender<SessionCommand>,
    epoch: u64,
    gate: Gate,
    hotplug: Option<Subscription>,
    listeners: HashMap<String, Subscription>,
}

impl DeviceSession {
    /// Enter the listening state.
    ///
    /// `epoch` tags every command this session's callbacks enqueue so the
    /// owner can discard commands that outlive the session.
    pub fn enter(
        access: Arc<dyn AccessHandle>,
        commands: WeakUnboundedSender<SessionCommand>,
        epoch: u64,
    ) -> Self {
        let gate = Gate::open();

        let hotplug = {
            let gate = gate.clone();
            let commands = commands.clone();
            access.subscribe_hotplug(Box::new(move |notification: PortNotification| {
                if !gate.is_open() {
                    return;
                }
                if let Some(tx) = commands.upgrade() {
                    let _ = tx.send(SessionCommand::Hotplug {
                        epoch,
                        notification,
                    });
                }
            }))
        };

        let devices = access.list_inputs();

        let mut session = Self {
            context: DeviceSessionContext {
                access,
                selected_device_id: None,
            },
            devices,
            commands,
            epoch,
            gate,
            hotplug: Some(hotplug),
            listeners: HashMap::new(),
        };

        let connected: Vec<String> = session
            .devices
            .iter()
            .filter(|d| d.is_connected())
            .map(|d| d.id.clone())
            .collect();
        for id in connected {
            session.listen(&id);
        }

        info!(
            "Listening on {} of {} MIDI input(s)",
            session.listeners.len(),
            session.devices.len()
        );
        session
    }

    pub fn context(&self) -> &DeviceSessionContext {
        &self.context
    }

    pub fn selected_device_id(&self) -> Option<&str> {
        self.context.selected_device_id.as_deref()
    }

    /// Known input devices with their last reported connection state
    pub fn devices(&self) -> &[MidiDeviceDescriptor] {
        &self.devices
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_listening(&self) -> bool {
        self.gate.is_open()
    }

    /// Apply one event to the session.
    ///
    /// Selecting a device that is not connected is rejected and leaves the
    /// context untouched.
    pub fn handle(&mut self, event: DeviceEvent) -> Result<Changes, SessionError> {
        let mut changes = Changes::default();

        match event {
            DeviceEvent::SelectDevice(id) => {
                if self.selected_device_id() == Some(id.as_str()) {
                    return Ok(changes);
                }
                if !self.devices.iter().any(|d| d.id == id && d.is_connected()) {
                    return Err(SessionError::DeviceUnavailable(id));
                }
                info!("Selected MIDI input '{}'", id);
                self.context.selected_device_id = Some(id);
                changes.selection = true;
            }
            DeviceEvent::DeselectDevice => {
                if let Some(id) = self.context.selected_device_id.take() {
                    info!("Deselected MIDI input '{}'", id);
                    changes.selection = true;
                }
            }
            DeviceEvent::DevicePortConnected(port) => {
                debug!("MIDI input connected: '{}'", port.id);
                self.listen(&port.id);
                changes.devices = self.upsert(port);
            }
            DeviceEvent::DevicePortDisconnected(port) => {
                debug!("MIDI input disconnected: '{}'", port.id);
                if let Some(listener) = self.listeners.remove(&port.id) {
                    listener.unsubscribe();
                }
                if self.selected_device_id() == Some(port.id.as_str()) {
                    info!("Selected MIDI input '{}' disconnected, clearing selection", port.id);
                    self.context.selected_device_id = None;
                    changes.selection = true;
                }
                changes.devices = self.upsert(port);
            }
        }

        Ok(changes)
    }

    /// Filter and decode a raw message from `port_id`.
    ///
    /// Returns the decoded event only for the selected port. Ignored statuses
    /// are dropped silently, malformed messages with a warning.
    pub fn accept_message(&self, port_id: &str, data: &[u8]) -> Option<MidiEvent> {
        if midi::is_ignored(data) {
            return None;
        }

        if self.selected_device_id() != Some(port_id) {
            trace!("Dropping message from unselected input '{}'", port_id);
            return None;
        }

        match midi::decode(data) {
            Ok(event) => {
                trace!("{} <- '{}' [{}]", event, port_id, format_hex(data));
                Some(event)
            }
            Err(e) => {
                warn!("Dropping MIDI from '{}': {} [{}]", port_id, e, format_hex(data));
                None
            }
        }
    }

    /// Leave the listening state and release every listener. Idempotent.
    pub fn exit(&mut self) {
        if !self.gate.is_open() {
            return;
        }

        self.gate.close();

        let released = self.listeners.len() + usize::from(self.hotplug.is_some());
        if let Some(hotplug) = self.hotplug.take() {
            hotplug.unsubscribe();
        }
        for (_, listener) in self.listeners.drain() {
            listener.unsubscribe();
        }

        info!("Device session exited, released {} listener(s)", released);
    }

    fn listen(&mut self, port_id: &str) {
        if self.listeners.contains_key(port_id) {
            return;
        }

        let gate = self.gate.clone();
        let commands = self.commands.clone();
        let epoch = self.epoch;
        let id = port_id.to_string();

        let callback = Box::new(move |data: &[u8]| {
            if !gate.is_open() {
                return;
            }
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(SessionCommand::PortMessage {
                    epoch,
                    port_id: id.clone(),
                    data: data.to_vec(),
                });
            }
        });

        match self.context.access.subscribe_messages(port_id, callback) {
            Ok(subscription) => {
                self.listeners.insert(port_id.to_string(), subscription);
            }
            Err(e) => warn!("Skipping MIDI input '{}': {}", port_id, e),
        }
    }

    /// Insert or update a device entry; returns true if the list changed
    fn upsert(&mut self, port: MidiDeviceDescriptor) -> bool {
        match self.devices.iter_mut().find(|d| d.id == port.id) {
            Some(existing) if *existing == port => false,
            Some(existing) => {
                *existing = port;
                true
            }
            None => {
                self.devices.push(port);
                true
            }
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.exit();
    }
}

//! SessionActor - orchestrates MIDI access and the device session
//!
//! The actor owns all session state and processes [`SessionCommand`]s one at
//! a time. Its phases are:
//!
//! ```text
//!   Requesting ──granted/prompt + access ok──▶ Loaded(DeviceSession)
//!       │                      │
//!       │ denied               │ access failed
//!       ▼                      ▼
//!   PermissionDenied ◀─────────┘
//!
//!   any phase ──Stop──▶ Stopped
//! ```
//!
//! Permission and access requests are awaited inside the run loop, so
//! commands arriving meanwhile wait in the queue and run afterwards in
//! arrival order. `Stop` is accepted in every phase and clears the published
//! devices and selection; `Restart` re-enters `Requesting` after tearing down
//! the current device session.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Sender, UnboundedReceiver, WeakUnboundedSender};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::commands::SessionCommand;
use super::device::{Changes, DeviceEvent, DeviceSession};
use super::handle::SessionHandle;
use super::{InputEvent, SessionOptions, SessionState, EVENT_BUFFER};
use crate::error::{AccessError, SessionError};
use crate::platform::{
    AccessHandle, MidiAccess, MidiDeviceDescriptor, PermissionStatus, PortNotification,
};

enum Phase {
    Requesting,
    Loaded(DeviceSession),
    PermissionDenied(AccessError),
    Stopped,
}

/// Actor responsible for the MIDI session lifecycle
pub struct SessionActor {
    access: Arc<dyn MidiAccess>,
    options: SessionOptions,
    phase: Phase,

    /// Incoming commands from handles and platform callbacks
    command_rx: UnboundedReceiver<SessionCommand>,

    /// Handed to device sessions; weak so that dropping every handle ends the actor
    command_tx: WeakUnboundedSender<SessionCommand>,

    state_tx: watch::Sender<SessionState>,
    devices_tx: watch::Sender<Vec<MidiDeviceDescriptor>>,
    selected_tx: watch::Sender<Option<String>>,

    /// Decoded events from the selected input; full buffer drops events
    events_tx: Sender<InputEvent>,

    /// Incremented per device session; stale notifications carry an older epoch
    epoch: u64,
}

impl SessionActor {
    /// Spawn a new SessionActor and return a handle for interacting with it
    pub fn spawn(access: Arc<dyn MidiAccess>, options: SessionOptions) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Loading);
        let (devices_tx, devices_rx) = watch::channel(Vec::new());
        let (selected_tx, selected_rx) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let actor = SessionActor {
            access,
            options,
            phase: Phase::Requesting,
            command_rx: cmd_rx,
            command_tx: cmd_tx.downgrade(),
            state_tx,
            devices_tx,
            selected_tx,
            events_tx,
            epoch: 0,
        };

        tokio::spawn(actor.run());

        info!("SessionActor spawned");

        SessionHandle::new(cmd_tx, state_rx, devices_rx, selected_rx, events_rx)
    }

    async fn run(mut self) {
        debug!("SessionActor run loop started");

        self.request_access().await;

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                SessionCommand::SelectDevice { id, response } => {
                    let result = self.handle_device_event(DeviceEvent::SelectDevice(id));
                    match response {
                        Some(response) => {
                            let _ = response.send(result);
                        }
                        None => {
                            if let Err(e) = result {
                                warn!("Device selection rejected: {}", e);
                            }
                        }
                    }
                }
                SessionCommand::DeselectDevice => {
                    if let Err(e) = self.handle_device_event(DeviceEvent::DeselectDevice) {
                        debug!("Deselect ignored: {}", e);
                    }
                }
                SessionCommand::Restart => {
                    info!("Restarting MIDI session");
                    self.leave_loaded();
                    self.request_access().await;
                }
                SessionCommand::Stop { done } => {
                    self.stop();
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    return;
                }
                SessionCommand::Hotplug {
                    epoch,
                    notification,
                } => self.handle_hotplug(epoch, notification),
                SessionCommand::PortMessage {
                    epoch,
                    port_id,
                    data,
                } => self.handle_port_message(epoch, &port_id, &data),
            }
        }

        debug!("All session handles dropped");
        self.stop();
    }

    /// Requesting phase: permission query, then access request
    async fn request_access(&mut self) {
        self.phase = Phase::Requesting;
        self.publish_all();

        let permission = self.access.query_permission().await;
        debug!(?permission, "MIDI permission status");

        if permission == PermissionStatus::Denied {
            self.deny(AccessError::PermissionDenied);
            return;
        }

        match self.access.request_access().await {
            Ok(handle) => self.load(handle),
            Err(e) => self.deny(e),
        }
    }

    fn deny(&mut self, error: AccessError) {
        warn!("MIDI session unavailable: {}", error);
        self.phase = Phase::PermissionDenied(error);
        self.publish_all();
    }

    fn load(&mut self, access: Arc<dyn AccessHandle>) {
        self.epoch += 1;
        let mut session = DeviceSession::enter(access, self.command_tx.clone(), self.epoch);

        if let Some(id) = self.auto_select_target(&session) {
            if let Err(e) = session.handle(DeviceEvent::SelectDevice(id)) {
                warn!("Auto-selection failed: {}", e);
            }
        }

        self.phase = Phase::Loaded(session);
        info!("MIDI session loaded");
        self.publish_all();
    }

    /// Device picked on entry to `Loaded`: the first connected input whose
    /// name contains the preferred pattern, or the first connected input
    /// when auto-select is on and no pattern is configured.
    fn auto_select_target(&self, session: &DeviceSession) -> Option<String> {
        let mut connected = session.devices().iter().filter(|d| d.is_connected());

        match &self.options.preferred_device {
            Some(pattern) => {
                let pattern = pattern.to_lowercase();
                let found = connected
                    .find(|d| d.name.to_lowercase().contains(&pattern))
                    .map(|d| d.id.clone());
                if found.is_none() {
                    warn!("No connected MIDI input matches '{}'", pattern);
                }
                found
            }
            None if self.options.auto_select => connected.next().map(|d| d.id.clone()),
            None => None,
        }
    }

    fn leave_loaded(&mut self) {
        if let Phase::Loaded(session) = &mut self.phase {
            session.exit();
        }
        self.phase = Phase::Requesting;
    }

    fn stop(&mut self) {
        if let Phase::Loaded(session) = &mut self.phase {
            session.exit();
        }
        self.phase = Phase::Stopped;
        self.publish_all();
        info!("MIDI session stopped");
    }

    fn handle_device_event(&mut self, event: DeviceEvent) -> Result<(), SessionError> {
        let Phase::Loaded(session) = &mut self.phase else {
            return Err(SessionError::NotLoaded);
        };

        let changes = session.handle(event)?;
        self.publish(changes);
        Ok(())
    }

    fn handle_hotplug(&mut self, epoch: u64, notification: PortNotification) {
        if !self.is_current(epoch) {
            trace!("Dropping stale hot-plug notification (epoch {})", epoch);
            return;
        }

        let Some(event) = DeviceEvent::from_notification(notification) else {
            debug!("Dropping hot-plug notification without a port");
            return;
        };

        if let Err(e) = self.handle_device_event(event) {
            debug!("Hot-plug notification ignored: {}", e);
        }
    }

    fn handle_port_message(&mut self, epoch: u64, port_id: &str, data: &[u8]) {
        let Phase::Loaded(session) = &self.phase else {
            return;
        };
        if session.epoch() != epoch {
            trace!("Dropping stale message from '{}' (epoch {})", port_id, epoch);
            return;
        }

        let Some(event) = session.accept_message(port_id, data) else {
            return;
        };

        let input = InputEvent {
            device_id: port_id.to_string(),
            event,
        };
        match self.events_tx.try_send(input) {
            Ok(()) => {}
            Err(TrySendError::Full(input)) => {
                debug!("Event buffer full, dropping {}", input.event);
            }
            Err(TrySendError::Closed(_)) => trace!("No consumer for note events"),
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        matches!(&self.phase, Phase::Loaded(session) if session.epoch() == epoch)
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    fn publish(&self, changes: Changes) {
        if changes.devices {
            self.publish_devices();
        }
        if changes.selection {
            self.publish_selection();
            self.publish_state();
        }
    }

    fn publish_all(&self) {
        self.publish_devices();
        self.publish_selection();
        self.publish_state();
    }

    fn publish_state(&self) {
        let state = match &self.phase {
            Phase::Requesting => SessionState::Loading,
            Phase::Loaded(session) => SessionState::Loaded(session.context().clone()),
            Phase::PermissionDenied(error) => SessionState::PermissionError(error.clone()),
            Phase::Stopped => SessionState::Stopped,
        };
        self.state_tx.send_replace(state);
    }

    fn publish_devices(&self) {
        let devices = match &self.phase {
            Phase::Loaded(session) => session.devices().to_vec(),
            _ => Vec::new(),
        };
        self.devices_tx.send_if_modified(|current| {
            if *current == devices {
                return false;
            }
            *current = devices;
            true
        });
    }

    fn publish_selection(&self) {
        let selected = match &self.phase {
            Phase::Loaded(session) => session.selected_device_id().map(str::to_string),
            _ => None,
        };
        self.selected_tx.send_if_modified(|current| {
            if *current == selected {
                return false;
            }
            *current = selected;
            true
        });
    }
}

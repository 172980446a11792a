//! SessionHandle - Public API for the SessionActor
//!
//! Wraps the actor's command channel and the watch channels it publishes
//! on. Cloning a handle is cheap; the actor stops once every handle is
//! dropped or [`SessionHandle::stop`] is called.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{Receiver, UnboundedSender};
use tokio::sync::{oneshot, watch};

use super::actor::SessionActor;
use super::commands::SessionCommand;
use super::{InputEvent, SessionOptions, SessionState};
use crate::error::SessionError;
use crate::platform::{MidiAccess, MidiDeviceDescriptor};

/// Handle for interacting with the SessionActor
///
/// # Observers
/// - `state` / `watch_state` - loading, loaded, or permission error
/// - `devices` / `watch_devices` - known inputs and their connection state
/// - `selected` / `watch_selected` - selected input id
/// - `take_event_receiver` - decoded events from the selected input
///
/// # Actions
/// - `select_device` / `deselect_device`
/// - `restart` / `stop`
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: UnboundedSender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
    devices_rx: watch::Receiver<Vec<MidiDeviceDescriptor>>,
    selected_rx: watch::Receiver<Option<String>>,
    events_rx: Arc<Mutex<Option<Receiver<InputEvent>>>>,
}

impl SessionHandle {
    pub(crate) fn new(
        cmd_tx: UnboundedSender<SessionCommand>,
        state_rx: watch::Receiver<SessionState>,
        devices_rx: watch::Receiver<Vec<MidiDeviceDescriptor>>,
        selected_rx: watch::Receiver<Option<String>>,
        events_rx: Receiver<InputEvent>,
    ) -> Self {
        Self {
            cmd_tx,
            state_rx,
            devices_rx,
            selected_rx,
            events_rx: Arc::new(Mutex::new(Some(events_rx))),
        }
    }

    /// Spawn a new SessionActor and return a handle
    ///
    /// This is a convenience wrapper around `SessionActor::spawn`.
    pub fn spawn(access: Arc<dyn MidiAccess>, options: SessionOptions) -> Self {
        SessionActor::spawn(access, options)
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn devices(&self) -> Vec<MidiDeviceDescriptor> {
        self.devices_rx.borrow().clone()
    }

    pub fn watch_devices(&self) -> watch::Receiver<Vec<MidiDeviceDescriptor>> {
        self.devices_rx.clone()
    }

    pub fn selected(&self) -> Option<String> {
        self.selected_rx.borrow().clone()
    }

    pub fn watch_selected(&self) -> watch::Receiver<Option<String>> {
        self.selected_rx.clone()
    }

    /// Take the event receiver (only the first caller gets it).
    ///
    /// The stream holds at most [`super::EVENT_BUFFER`] unread events; the
    /// actor drops newer ones until the consumer catches up.
    pub fn take_event_receiver(&self) -> Option<Receiver<InputEvent>> {
        self.events_rx.lock().take()
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Select a connected input. Resolves once the actor has processed every
    /// command queued before this one.
    pub async fn select_device(&self, id: impl Into<String>) -> Result<(), SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SessionCommand::SelectDevice {
            id: id.into(),
            response: Some(response_tx),
        };

        if self.cmd_tx.send(cmd).is_err() {
            return Err(SessionError::Stopped);
        }

        response_rx.await.unwrap_or(Err(SessionError::Stopped))
    }

    /// Fire-and-forget: clear the selection
    pub fn deselect_device(&self) {
        let _ = self.cmd_tx.send(SessionCommand::DeselectDevice);
    }

    /// Fire-and-forget: tear down and request access again
    pub fn restart(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Restart);
    }

    /// Stop the session and wait until every listener is released
    pub async fn stop(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SessionCommand::Stop {
                done: Some(done_tx),
            })
            .is_err()
        {
            return;
        }
        let _ = done_rx.await;
    }

    /// Check if the actor is still running
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

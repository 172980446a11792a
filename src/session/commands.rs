//! Commands processed by the session actor
//!
//! Everything that can change session state arrives here: caller actions from
//! [`super::SessionHandle`] and platform notifications enqueued by the
//! device session's listeners. The actor handles them strictly in arrival
//! order.

use tokio::sync::oneshot;

use crate::error::SessionError;
use crate::platform::PortNotification;

#[derive(Debug)]
pub enum SessionCommand {
    // -------------------------------------------------------------------------
    // Caller actions
    // -------------------------------------------------------------------------
    /// Select the input whose messages feed the note stream
    SelectDevice {
        id: String,
        response: Option<oneshot::Sender<Result<(), SessionError>>>,
    },

    /// Clear the selected input
    DeselectDevice,

    /// Tear down and run the permission/access flow again
    Restart,

    /// Tear down and halt the actor; `done` fires once listeners are released
    Stop { done: Option<oneshot::Sender<()>> },

    // -------------------------------------------------------------------------
    // Platform notifications, tagged with the device session epoch
    // -------------------------------------------------------------------------
    /// Hot-plug notification from the access handle
    Hotplug {
        epoch: u64,
        notification: PortNotification,
    },

    /// Raw message received on an input port
    PortMessage {
        epoch: u64,
        port_id: String,
        data: Vec<u8>,
    },
}

//! Desktop MIDI backend built on midir
//!
//! Desktop operating systems do not gate MIDI input behind a permission
//! prompt, so the permission query always reports `Granted`. midir has no
//! hot-plug events; a tokio task polls the port list and reports the
//! difference.
//!
//! midir exposes no stable hardware identifier, so port names double as port
//! ids. Identical names are told apart by enumeration order (`Piano`,
//! `Piano #2`); if the OS reorders two identical devices, their ids swap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use midir::{Ignore, MidiInput, MidiInputPort};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    AccessHandle, ConnectionState, HotplugCallback, MessageCallback, MidiAccess,
    MidiDeviceDescriptor, PermissionStatus, PortNotification, Subscription,
};
use crate::config::MidiConfig;
use crate::error::{AccessError, PlatformError};

/// midir reports no vendor information
const UNKNOWN_MANUFACTURER: &str = "unknown";

/// midir-backed [`MidiAccess`]
///
/// Port ids are derived from port names. Two identical keyboards are
/// distinguished only by enumeration order, so their ids are unique but not
/// tied to a physical device.
pub struct MidirAccess {
    client_name: String,
    poll_interval: Duration,
}

impl MidirAccess {
    pub fn new(config: &MidiConfig) -> Self {
        Self {
            client_name: config.client_name.clone(),
            poll_interval: Duration::from_millis(config.hotplug_poll_ms),
        }
    }
}

#[async_trait]
impl MidiAccess for MidirAccess {
    async fn query_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn request_access(&self) -> Result<Arc<dyn AccessHandle>, AccessError> {
        let runtime = Handle::try_current()
            .map_err(|e| AccessError::Unavailable(format!("no async runtime: {}", e)))?;

        // Opening a client proves the MIDI subsystem is reachable
        MidiInput::new(&self.client_name).map_err(|e| AccessError::Unavailable(e.to_string()))?;

        info!("MIDI access granted (client '{}')", self.client_name);

        Ok(Arc::new(MidirHandle {
            client_name: self.client_name.clone(),
            poll_interval: self.poll_interval,
            runtime,
        }))
    }
}

/// Granted midir access
pub struct MidirHandle {
    client_name: String,
    poll_interval: Duration,
    runtime: Handle,
}

impl AccessHandle for MidirHandle {
    fn list_inputs(&self) -> Vec<MidiDeviceDescriptor> {
        enumerate(&self.client_name).unwrap_or_else(|e| {
            warn!("Failed to enumerate MIDI inputs: {}", e);
            Vec::new()
        })
    }

    fn subscribe_hotplug(&self, callback: HotplugCallback) -> Subscription {
        // Taken before the caller lists inputs, so a port appearing in
        // between is still reported by the first poll
        let baseline = enumerate(&self.client_name).unwrap_or_else(|e| {
            debug!("Hot-plug baseline unavailable: {}", e);
            Vec::new()
        });

        let client_name = self.client_name.clone();
        let task = spawn_poller(
            &self.runtime,
            self.poll_interval,
            baseline,
            move || enumerate(&client_name),
            callback,
        );

        debug!("Hot-plug polling every {:?}", self.poll_interval);
        Subscription::new(move || task.abort())
    }

    fn subscribe_messages(
        &self,
        port_id: &str,
        callback: MessageCallback,
    ) -> Result<Subscription, PlatformError> {
        let mut midi_in = MidiInput::new(&self.client_name)?;
        // Active sensing and friends are filtered by the session, not the driver
        midi_in.ignore(Ignore::None);

        let port = named_ports(&midi_in)
            .into_iter()
            .find(|(id, _, _)| id == port_id)
            .map(|(_, _, port)| port)
            .ok_or_else(|| PlatformError::PortNotFound(port_id.to_string()))?;

        let connection = midi_in
            .connect(
                &port,
                &format!("{}-{}", self.client_name, port_id),
                move |_timestamp, data, _| callback(data),
                (),
            )
            .map_err(|e| PlatformError::Connect {
                port: port_id.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Listening on MIDI input '{}'", port_id);

        Ok(Subscription::new(move || {
            connection.close();
        }))
    }
}

/// Poll `enumerate` every `poll_interval` and report changes against
/// `baseline`.
fn spawn_poller<E>(
    runtime: &Handle,
    poll_interval: Duration,
    baseline: Vec<MidiDeviceDescriptor>,
    mut enumerate: E,
    callback: HotplugCallback,
) -> JoinHandle<()>
where
    E: FnMut() -> Result<Vec<MidiDeviceDescriptor>, PlatformError> + Send + 'static,
{
    runtime.spawn(async move {
        let mut known: HashMap<String, MidiDeviceDescriptor> =
            baseline.into_iter().map(|d| (d.id.clone(), d)).collect();

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.tick().await; // first tick completes immediately

        loop {
            ticker.tick().await;

            let current = match enumerate() {
                Ok(ports) => ports,
                Err(e) => {
                    debug!("Hot-plug poll failed: {}", e);
                    continue;
                }
            };

            for notification in diff_ports(&mut known, current) {
                callback(notification);
            }
        }
    })
}

/// Input ports with their ids, in enumeration order
fn named_ports(midi_in: &MidiInput) -> Vec<(String, String, MidiInputPort)> {
    let named: Vec<(String, MidiInputPort)> = midi_in
        .ports()
        .into_iter()
        .filter_map(|port| midi_in.port_name(&port).ok().map(|name| (name, port)))
        .collect();

    let ids = assign_ids(named.iter().map(|(name, _)| name.as_str()));

    ids.into_iter()
        .zip(named)
        .map(|(id, (name, port))| (id, name, port))
        .collect()
}

/// Ids for port names in enumeration order: the first port with a name keeps
/// it, later ones with the same name get ` #2`, ` #3` and so on.
fn assign_ids<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<&'a str, usize> = HashMap::new();

    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name).or_insert(0);
            *count += 1;
            if *count == 1 {
                name.to_string()
            } else {
                format!("{} #{}", name, count)
            }
        })
        .collect()
}

/// Enumerate input ports as connected descriptors
fn enumerate(client_name: &str) -> Result<Vec<MidiDeviceDescriptor>, PlatformError> {
    let midi_in = MidiInput::new(&format!("{}-scan", client_name))?;

    Ok(named_ports(&midi_in)
        .into_iter()
        .map(|(id, name, _)| connected_port(id, name))
        .collect())
}

fn connected_port(id: String, name: String) -> MidiDeviceDescriptor {
    MidiDeviceDescriptor {
        id,
        name,
        manufacturer: UNKNOWN_MANUFACTURER.to_string(),
        state: ConnectionState::Connected,
    }
}

/// Compare a fresh enumeration against the known ports, update `known`, and
/// return one notification per port whose connection state changed.
fn diff_ports(
    known: &mut HashMap<String, MidiDeviceDescriptor>,
    current: Vec<MidiDeviceDescriptor>,
) -> Vec<PortNotification> {
    let mut notifications = Vec::new();

    for port in &current {
        let changed = known
            .get(&port.id)
            .map(|k| !k.is_connected())
            .unwrap_or(true);

        if changed {
            known.insert(port.id.clone(), port.clone());
            notifications.push(PortNotification {
                port: Some(port.clone()),
            });
        }
    }

    for port in known.values_mut() {
        if port.is_connected() && !current.iter().any(|c| c.id == port.id) {
            port.state = ConnectionState::Disconnected;
            notifications.push(PortNotification {
                port: Some(port.clone()),
            });
        }
    }

    notifications
}

/// Print MIDI input ports for `--list-ports`
pub fn print_ports(client_name: &str) {
    println!("\n=== MIDI Input Ports ===");
    match enumerate(client_name) {
        Ok(ports) if ports.is_empty() => println!("  (none)"),
        Ok(ports) => {
            for (i, port) in ports.iter().enumerate() {
                println!("  {}: {}", i, port.name);
            }
        }
        Err(e) => println!("  failed to enumerate: {}", e),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn port(name: &str) -> MidiDeviceDescriptor {
        connected_port(name.to_string(), name.to_string())
    }

    fn ids(notifications: &[PortNotification]) -> Vec<(String, ConnectionState)> {
        let mut out: Vec<_> = notifications
            .iter()
            .filter_map(|n| n.port.as_ref())
            .map(|p| (p.id.clone(), p.state))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[test]
    fn test_diff_reports_new_and_removed_ports() {
        let mut known: HashMap<_, _> = [port("Piano")]
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        let notes = diff_ports(&mut known, vec![port("Pads")]);
        assert_eq!(
            ids(&notes),
            vec![
                ("Pads".to_string(), ConnectionState::Connected),
                ("Piano".to_string(), ConnectionState::Disconnected),
            ]
        );

        // Steady state produces nothing
        assert!(diff_ports(&mut known, vec![port("Pads")]).is_empty());

        // Reconnect of a previously seen port
        let notes = diff_ports(&mut known, vec![port("Pads"), port("Piano")]);
        assert_eq!(ids(&notes), vec![("Piano".to_string(), ConnectionState::Connected)]);
    }

    #[test]
    fn test_identical_names_get_distinct_ids() {
        let ids = assign_ids(["Piano", "Pads", "Piano", "Piano"]);
        assert_eq!(ids, vec!["Piano", "Pads", "Piano #2", "Piano #3"]);
    }

    #[tokio::test]
    async fn test_poller_reports_port_added_after_baseline() {
        let ports = Arc::new(Mutex::new(vec![port("Piano")]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let source = ports.clone();
        let task = spawn_poller(
            &Handle::current(),
            Duration::from_millis(5),
            vec![port("Piano")],
            move || Ok(source.lock().clone()),
            Box::new(move |notification: PortNotification| {
                let _ = tx.send(notification);
            }),
        );

        // Appears after the baseline, before the first poll
        ports.lock().push(port("Pads"));

        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.port, Some(port("Pads")));
        task.abort();
    }

    #[test]
    fn test_port_discovery() {
        // Only ensures enumeration does not panic on machines without MIDI
        let _ = enumerate("midi-staff-test");
    }
}

//! In-memory MIDI platform for tests
//!
//! Keeps every callback it was ever given so tests can fire callbacks whose
//! subscription was already released (`*_unchecked`) and check that the
//! session ignores them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{
    AccessHandle, ConnectionState, HotplugCallback, MessageCallback, MidiAccess,
    MidiDeviceDescriptor, PermissionStatus, PortNotification, Subscription,
};
use crate::error::{AccessError, PlatformError};

pub(crate) fn device(id: &str) -> MidiDeviceDescriptor {
    MidiDeviceDescriptor {
        id: id.to_string(),
        name: format!("{} Keyboard", id),
        manufacturer: "Fake".to_string(),
        state: ConnectionState::Connected,
    }
}

struct Registration<F: ?Sized> {
    active: Arc<AtomicBool>,
    callback: Arc<F>,
}

type Hotplug = dyn Fn(PortNotification) + Send + Sync;
type Message = dyn Fn(&[u8]) + Send + Sync;

#[derive(Default)]
struct FakeInner {
    inputs: Vec<MidiDeviceDescriptor>,
    hotplug: Vec<Registration<Hotplug>>,
    listeners: Vec<(String, Registration<Message>)>,
    failing: HashSet<String>,
}

#[derive(Default)]
pub(crate) struct FakeHandle {
    inner: Mutex<FakeInner>,
    active: Arc<AtomicUsize>,
}

impl FakeHandle {
    pub fn new(inputs: Vec<MidiDeviceDescriptor>) -> Arc<Self> {
        let handle = Self::default();
        handle.inner.lock().inputs = inputs;
        Arc::new(handle)
    }

    /// Make listener registration fail for a port
    pub fn fail_port(&self, id: &str) {
        self.inner.lock().failing.insert(id.to_string());
    }

    /// Number of subscriptions not yet released
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn plug(&self, port: MidiDeviceDescriptor) {
        {
            let mut inner = self.inner.lock();
            inner.inputs.retain(|d| d.id != port.id);
            inner.inputs.push(port.clone());
        }
        self.hotplug(PortNotification { port: Some(port) });
    }

    pub fn unplug(&self, id: &str) {
        let port = {
            let mut inner = self.inner.lock();
            let Some(port) = inner.inputs.iter_mut().find(|d| d.id == id) else {
                return;
            };
            port.state = ConnectionState::Disconnected;
            port.clone()
        };
        self.hotplug(PortNotification { port: Some(port) });
    }

    /// Deliver a notification to active hot-plug subscribers
    pub fn hotplug(&self, notification: PortNotification) {
        for callback in self.hotplug_callbacks(false) {
            callback(notification.clone());
        }
    }

    /// Deliver a notification to every hot-plug callback ever registered
    pub fn hotplug_unchecked(&self, notification: PortNotification) {
        for callback in self.hotplug_callbacks(true) {
            callback(notification.clone());
        }
    }

    /// Deliver bytes to active listeners of a port
    pub fn send(&self, port_id: &str, data: &[u8]) {
        for callback in self.message_callbacks(port_id, false) {
            callback(data);
        }
    }

    /// Deliver bytes to every listener ever registered on a port
    pub fn send_unchecked(&self, port_id: &str, data: &[u8]) {
        for callback in self.message_callbacks(port_id, true) {
            callback(data);
        }
    }

    fn hotplug_callbacks(&self, include_released: bool) -> Vec<Arc<Hotplug>> {
        self.inner
            .lock()
            .hotplug
            .iter()
            .filter(|r| include_released || r.active.load(Ordering::SeqCst))
            .map(|r| r.callback.clone())
            .collect()
    }

    fn message_callbacks(&self, port_id: &str, include_released: bool) -> Vec<Arc<Message>> {
        self.inner
            .lock()
            .listeners
            .iter()
            .filter(|(id, r)| {
                id == port_id && (include_released || r.active.load(Ordering::SeqCst))
            })
            .map(|(_, r)| r.callback.clone())
            .collect()
    }

    fn track(&self) -> (Arc<AtomicBool>, Subscription) {
        let flag = Arc::new(AtomicBool::new(true));
        self.active.fetch_add(1, Ordering::SeqCst);

        let active = self.active.clone();
        let released = flag.clone();
        let subscription = Subscription::new(move || {
            released.store(false, Ordering::SeqCst);
            active.fetch_sub(1, Ordering::SeqCst);
        });
        (flag, subscription)
    }
}

impl AccessHandle for FakeHandle {
    fn list_inputs(&self) -> Vec<MidiDeviceDescriptor> {
        self.inner.lock().inputs.clone()
    }

    fn subscribe_hotplug(&self, callback: HotplugCallback) -> Subscription {
        let (active, subscription) = self.track();
        self.inner.lock().hotplug.push(Registration {
            active,
            callback: Arc::from(callback),
        });
        subscription
    }

    fn subscribe_messages(
        &self,
        port_id: &str,
        callback: MessageCallback,
    ) -> Result<Subscription, PlatformError> {
        {
            let inner = self.inner.lock();
            if inner.failing.contains(port_id) {
                return Err(PlatformError::Connect {
                    port: port_id.to_string(),
                    reason: "device busy".to_string(),
                });
            }
            if !inner.inputs.iter().any(|d| d.id == port_id) {
                return Err(PlatformError::PortNotFound(port_id.to_string()));
            }
        }

        let (active, subscription) = self.track();
        self.inner.lock().listeners.push((
            port_id.to_string(),
            Registration {
                active,
                callback: Arc::from(callback),
            },
        ));
        Ok(subscription)
    }
}

/// Scriptable [`MidiAccess`]
pub(crate) struct FakeAccess {
    permission: Mutex<PermissionStatus>,
    failure: Mutex<Option<AccessError>>,
    handle: Arc<FakeHandle>,
    requests: AtomicUsize,
    hold: Option<Arc<Notify>>,
}

impl FakeAccess {
    pub fn new(permission: PermissionStatus, handle: Arc<FakeHandle>) -> Self {
        Self {
            permission: Mutex::new(permission),
            failure: Mutex::new(None),
            handle,
            requests: AtomicUsize::new(0),
            hold: None,
        }
    }

    pub fn granted(handle: Arc<FakeHandle>) -> Self {
        Self::new(PermissionStatus::Granted, handle)
    }

    /// Access requests fail with `error`
    pub fn failing(mut self, error: AccessError) -> Self {
        self.failure = Mutex::new(Some(error));
        self
    }

    /// Access requests wait until the returned notifier fires
    pub fn held(mut self) -> (Self, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        self.hold = Some(notify.clone());
        (self, notify)
    }

    pub fn set_permission(&self, permission: PermissionStatus) {
        *self.permission.lock() = permission;
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MidiAccess for FakeAccess {
    async fn query_permission(&self) -> PermissionStatus {
        tokio::task::yield_now().await;
        *self.permission.lock()
    }

    async fn request_access(&self) -> Result<Arc<dyn AccessHandle>, AccessError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }

        let failure = self.failure.lock().clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.handle.clone()),
        }
    }
}

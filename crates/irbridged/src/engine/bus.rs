//! Per-device notification bus.
//!
//! A typed publish/subscribe channel per device. Subscriptions are plain
//! receiver handles: dropping one releases it, and removing a device closes
//! its channel so every outstanding subscription ends.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use super::message::DeviceSeed;
use super::state::{IrHvac, Liveness};

/// Capacity for each per-device broadcast channel. Device events are small
/// and infrequent; lagging subscribers lose the oldest events.
const DEVICE_CHANNEL_CAPACITY: usize = 16;

/// A state-change notification for one device.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The applied IRHVAC state changed
    Set(IrHvac),

    /// Liveness changed
    Lwt(Liveness),

    /// The device was removed; no further events will follow
    Removed,
}

/// A live subscription to one device's event channel.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<DeviceEvent>,
}

impl Subscription {
    /// Receive the next event. Returns an error once the device's channel
    /// has closed (device removed) and all buffered events were consumed.
    pub async fn recv(&mut self) -> Result<DeviceEvent, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

/// Fan-out point for device notifications.
pub struct DeviceBus {
    channels: Mutex<HashMap<String, broadcast::Sender<DeviceEvent>>>,
    new_device: broadcast::Sender<DeviceSeed>,
}

impl DeviceBus {
    pub fn new() -> Self {
        let (new_device, _) = broadcast::channel(DEVICE_CHANNEL_CAPACITY);
        Self {
            channels: Mutex::new(HashMap::new()),
            new_device,
        }
    }

    /// Announce a device, creating its channel if needed, and notify
    /// new-device subscribers. Announcements are unconditional: a known
    /// device re-announcing keeps its channel (and its subscribers).
    pub fn announce(&self, seed: &DeviceSeed) {
        {
            let mut channels = self.channels.lock().expect("bus lock poisoned");
            channels.entry(seed.uuid.clone()).or_insert_with(|| {
                debug!("Opening event channel for device {}", seed.uuid);
                broadcast::channel(DEVICE_CHANNEL_CAPACITY).0
            });
        }

        // No new-device subscribers is fine
        let _ = self.new_device.send(seed.clone());
    }

    /// Publish an event on a device's channel. Unknown devices and channels
    /// with no subscribers are silent no-ops.
    pub fn publish(&self, uuid: &str, event: DeviceEvent) {
        let channels = self.channels.lock().expect("bus lock poisoned");
        if let Some(tx) = channels.get(uuid) {
            let _ = tx.send(event);
        }
    }

    /// Publish `Removed` and close the device's channel.
    pub fn remove(&self, uuid: &str) {
        let mut channels = self.channels.lock().expect("bus lock poisoned");
        if let Some(tx) = channels.remove(uuid) {
            debug!("Closing event channel for device {}", uuid);
            let _ = tx.send(DeviceEvent::Removed);
        }
    }

    /// Subscribe to a device's event channel, if the device is known.
    pub fn subscribe(&self, uuid: &str) -> Option<Subscription> {
        let channels = self.channels.lock().expect("bus lock poisoned");
        channels.get(uuid).map(|tx| Subscription {
            rx: tx.subscribe(),
        })
    }

    /// Subscribe to device announcements.
    pub fn subscribe_new_devices(&self) -> broadcast::Receiver<DeviceSeed> {
        self.new_device.subscribe()
    }
}

impl Default for DeviceBus {
    fn default() -> Self {
        Self::new()
    }
}

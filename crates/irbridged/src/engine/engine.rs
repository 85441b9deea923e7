use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::bus::DeviceBus;
use super::bus::DeviceEvent;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::IntegrationContext;
use super::integration::ToIntegrationSender;
use super::message::DeviceSeed;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use crate::facets::Facet;
use crate::facets::build_facets;

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No device known for uuid: {0}")]
    UnknownDevice(String),

    #[error("Integration channel closed: {0}")]
    IntegrationGone(String),
}

/// Facet set and discovery info for one device.
struct DeviceFacets {
    seed: DeviceSeed,
    facets: Vec<Box<dyn Facet>>,
}

/// irbridged engine
///
/// Routes integration events into per-device facets and the notification
/// bus, and routes commands from the API surface back to the owning
/// integration.
pub struct Engine {
    /// Per-device notification fan-out
    bus: DeviceBus,

    /// Facets rendered per device, keyed by uuid
    devices: std::sync::Mutex<HashMap<String, DeviceFacets>>,

    /// Map of uuid -> integration name for routing commands
    routes: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: HashMap<String, ToIntegrationSender>,

    /// Receive messages from integrations (events)
    message_rx: AsyncMutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            bus: DeviceBus::new(),
            devices: std::sync::Mutex::new(HashMap::new()),
            routes: std::sync::Mutex::new(HashMap::new()),
            integration_channels: HashMap::new(),
            message_rx: AsyncMutex::new(message_rx),
            message_tx,
            integration_handles: Vec::new(),
        }
    }

    /// Register integrations from configuration
    ///
    /// Walks the linkme registry and registers every integration whose
    /// configuration is present. Returns how many were registered.
    pub fn register_integrations_from_config(
        &mut self,
        cfg: &crate::config::Config,
    ) -> anyhow::Result<usize> {
        let ctx = IntegrationContext { config: cfg };
        let mut registered = 0;
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
            registered += 1;
        }

        Ok(registered)
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.push(handle);
    }

    /// Send a command to the integration owning the targeted device.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), EngineError> {
        let uuid = msg.uuid().to_string();

        let integration_name = {
            let routes = self.routes.lock().expect("routes lock poisoned");
            routes
                .get(&uuid)
                .cloned()
                .ok_or(EngineError::UnknownDevice(uuid))?
        };

        let tx = self
            .integration_channels
            .get(&integration_name)
            .ok_or_else(|| EngineError::IntegrationGone(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| EngineError::IntegrationGone(integration_name))
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations until every integration
    /// sender is gone.
    pub async fn run(&self) {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
    }

    /// The notification bus, for subscribing to device events.
    pub fn bus(&self) -> &DeviceBus {
        &self.bus
    }

    /// Whether a device with this uuid is currently known.
    pub fn has_device(&self, uuid: &str) -> bool {
        self.devices
            .lock()
            .expect("devices lock poisoned")
            .contains_key(uuid)
    }

    /// Render every device's facets to JSON, keyed by uuid then object id.
    pub fn state_snapshot(&self) -> serde_json::Value {
        let devices = self.devices.lock().expect("devices lock poisoned");

        let mut out = serde_json::Map::new();
        for (uuid, device) in devices.iter() {
            let mut entry = serde_json::Map::new();
            entry.insert(
                "topic".to_string(),
                serde_json::Value::String(device.seed.topic.clone()),
            );
            entry.insert(
                "info".to_string(),
                serde_json::json!({
                    "ip": device.seed.ip,
                    "hostname": device.seed.hostname,
                    "sw_version": device.seed.sw_version,
                }),
            );
            for facet in &device.facets {
                entry.insert(facet.object_id().to_string(), facet.state_json());
            }
            out.insert(uuid.clone(), serde_json::Value::Object(entry));
        }

        serde_json::Value::Object(out)
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::DeviceDiscovered {
                seed,
                integration_name,
            } => {
                info!("Device discovered: {} (from {})", seed.uuid, integration_name);

                // Record which integration owns this device for command
                // routing, then (re)build its facets. Rebuilding on
                // re-announcement mirrors entity re-materialization after a
                // restart.
                {
                    let mut routes = self.routes.lock().expect("routes lock poisoned");
                    routes.insert(seed.uuid.clone(), integration_name);
                }
                {
                    let mut devices = self.devices.lock().expect("devices lock poisoned");
                    devices.insert(
                        seed.uuid.clone(),
                        DeviceFacets {
                            facets: build_facets(&seed),
                            seed: seed.clone(),
                        },
                    );
                }
                self.bus.announce(&seed);
            }
            FromIntegrationMessage::HvacStateChanged { uuid, irhvac } => {
                self.dispatch(&uuid, DeviceEvent::Set(irhvac));
            }
            FromIntegrationMessage::LivenessChanged { uuid, lwt } => {
                info!("Device {} is {}", uuid, lwt);
                self.dispatch(&uuid, DeviceEvent::Lwt(lwt));
            }
            FromIntegrationMessage::DeviceRemoved { uuid } => {
                info!("Device removed: {}", uuid);

                {
                    let mut devices = self.devices.lock().expect("devices lock poisoned");
                    devices.remove(&uuid);
                }
                {
                    let mut routes = self.routes.lock().expect("routes lock poisoned");
                    routes.remove(&uuid);
                }
                self.bus.remove(&uuid);
            }
        }
    }

    /// Apply a device event to its facets and fan it out on the bus.
    fn dispatch(&self, uuid: &str, event: DeviceEvent) {
        {
            let mut devices = self.devices.lock().expect("devices lock poisoned");
            if let Some(device) = devices.get_mut(uuid) {
                for facet in device.facets.iter_mut() {
                    facet.handle_event(&event);
                }
            }
        }
        self.bus.publish(uuid, event);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

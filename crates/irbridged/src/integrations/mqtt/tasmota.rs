use std::error::Error;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttMessage;
use super::discovery::split_topic;
use super::discovery::topic_matches;
use super::registry::DeviceCache;
use super::registry::DeviceRegistry;
use crate::config::MqttConfig;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;
use crate::store::Store;
use crate::store::spawn_writer;

/// Type alias for the shared device registry
type SharedRegistry<C> = Arc<Mutex<DeviceRegistry<C>>>;

/// Tasmota IR-blaster integration
///
/// Bridges Tasmota devices speaking their native MQTT dialect (discovery
/// announcements, `stat`/`tele` telemetry, `cmnd` commands) into engine
/// devices.
pub struct TasmotaIntegration<C: MqttClient> {
    client: Arc<Mutex<C>>,
    config: MqttConfig,
    storage_dir: PathBuf,
    registry: SharedRegistry<C>,
    /// Handed to the store writer task during setup
    store_rx: Option<watch::Receiver<Option<DeviceCache>>>,
    to_engine: Option<FromIntegrationSender>,
    /// Handle to the background message processing task
    _message_task: Option<JoinHandle<()>>,
    /// Handle to the cache writer task
    _store_task: Option<JoinHandle<()>>,
}

impl<C: MqttClient> TasmotaIntegration<C> {
    /// Create a new Tasmota integration
    pub fn new(client: C, config: &MqttConfig, storage_dir: &Path) -> Self {
        let client = Arc::new(Mutex::new(client));
        let (store_tx, store_rx) = watch::channel(None);
        let registry = DeviceRegistry::new(
            client.clone(),
            config.model.clone(),
            config.discovery_topic.clone(),
            store_tx,
        );

        Self {
            client,
            config: config.clone(),
            storage_dir: storage_dir.to_path_buf(),
            registry: Arc::new(Mutex::new(registry)),
            store_rx: Some(store_rx),
            to_engine: None,
            _message_task: None,
            _store_task: None,
        }
    }

    /// Process incoming MQTT messages in a background task
    ///
    /// This is spawned as a separate tokio task in setup() so that
    /// handle_message() can process commands concurrently.
    async fn process_messages_task(
        client: Arc<Mutex<C>>,
        registry: SharedRegistry<C>,
        discovery_topic: String,
        to_engine: FromIntegrationSender,
    ) {
        loop {
            // Poll for a message with a short lock hold time so command
            // handling can interleave publishes.
            let msg = {
                let mut client_guard = client.lock().await;
                tokio::time::timeout(
                    std::time::Duration::from_millis(100),
                    client_guard.poll_message(),
                )
                .await
                .unwrap_or_default()
            };

            match msg {
                Some(msg) => {
                    let events = Self::dispatch(&registry, &discovery_topic, &msg).await;
                    for event in events {
                        if let Err(e) = to_engine.send(event).await {
                            warn!("Failed to send event to engine: {}", e);
                        }
                    }
                }
                None => {
                    // No message available, yield to allow other tasks
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Route one broker message to the registry handler its topic selects.
    async fn dispatch(
        registry: &SharedRegistry<C>,
        discovery_topic: &str,
        msg: &MqttMessage,
    ) -> Vec<FromIntegrationMessage> {
        if topic_matches(discovery_topic, &msg.topic) {
            return registry.lock().await.handle_discovery(&msg.payload);
        }

        let Some((prefix, device_topic, verb)) = split_topic(&msg.topic) else {
            return Vec::new();
        };

        match prefix {
            "stat" => registry
                .lock()
                .await
                .handle_stat(device_topic, verb, &msg.payload),
            "tele" => {
                registry
                    .lock()
                    .await
                    .handle_tele(device_topic, verb, &msg.payload)
                    .await
            }
            _ => Vec::new(),
        }
    }

    async fn notify_device_removed(&self, uuid: String) {
        let Some(to_engine) = &self.to_engine else {
            return;
        };
        let msg = FromIntegrationMessage::DeviceRemoved { uuid };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send DeviceRemoved message: {}", e);
        }
    }
}

#[async_trait]
impl<C: MqttClient + 'static> Integration for TasmotaIntegration<C> {
    fn name(&self) -> &str {
        super::INTEGRATION_NAME
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());

        // Restore the device cache before any broker traffic can race it
        let store = Store::new(&self.storage_dir, "devices.json");
        match store.load::<DeviceCache>().await {
            Ok(Some(cache)) => self.registry.lock().await.load(cache),
            Ok(None) => info!("No device cache found, starting empty"),
            Err(e) => {
                // A corrupt cache is recoverable: devices re-announce
                // themselves and climate state is re-learned.
                warn!("Failed to load device cache, starting empty: {}", e);
            }
        }

        if let Some(store_rx) = self.store_rx.take() {
            self._store_task = Some(spawn_writer(store, store_rx));
        }

        info!(
            "Connecting to MQTT broker at {}:{}",
            self.config.broker, self.config.port
        );
        {
            let mut client = self.client.lock().await;
            client.connect().await?;
        }
        info!("Connected to MQTT broker");

        // Discovery announcements plus every device's stat/tele streams;
        // the registry drops traffic from unknown devices.
        {
            let mut client = self.client.lock().await;
            client.subscribe(&self.config.discovery_topic).await?;
            client.subscribe("stat/#").await?;
            client.subscribe("tele/#").await?;
        }
        info!(
            "Subscribed to {} and stat/tele streams",
            self.config.discovery_topic
        );

        let client = self.client.clone();
        let registry = self.registry.clone();
        let discovery_topic = self.config.discovery_topic.clone();
        let task = tokio::spawn(async move {
            Self::process_messages_task(client, registry, discovery_topic, tx).await;
        });
        self._message_task = Some(task);

        info!("Tasmota integration ready");
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::SetHvacMode { uuid, mode } => {
                self.registry.lock().await.set_hvac_mode(&uuid, mode).await;
            }
            ToIntegrationMessage::SetFanMode { uuid, fan } => {
                self.registry.lock().await.set_fan_mode(&uuid, fan).await;
            }
            ToIntegrationMessage::SetTemperature { uuid, temp } => {
                self.registry
                    .lock()
                    .await
                    .set_temperature(&uuid, temp)
                    .await;
            }
            ToIntegrationMessage::StartPairing { uuid } => {
                if !self.registry.lock().await.grant_permit(&uuid) {
                    warn!("Pairing requested for unknown device {}", uuid);
                }
            }
            ToIntegrationMessage::RemoveDevice { uuid } => {
                let removed = self.registry.lock().await.remove_device(&uuid).await;
                match removed {
                    Some(uuid) => self.notify_device_removed(uuid).await,
                    None => warn!("Removal requested for unknown device {}", uuid),
                }
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Tasmota integration shutting down");
        if let Some(task) = self._message_task.take() {
            task.abort();
        }
        Ok(())
    }
}

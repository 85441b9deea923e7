//! The authoritative device table.
//!
//! Maintains the discovered IR blasters, mediates between Tasmota MQTT
//! traffic and the engine, and mirrors every mutation to the persisted
//! cache. The MQTT broker is a shared bus, so malformed payloads and
//! messages for unknown devices are silent no-ops throughout; nothing on
//! the message path is retried or surfaced as an error.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::INTEGRATION_NAME;
use super::client::MqttClient;
use super::discovery::{DiscoveryPayload, discovery_config_topic};
use crate::engine::message::{DeviceSeed, FromIntegrationMessage};
use crate::engine::state::{FanMode, HvacMode, IrHvac, Liveness};

/// How long a pairing permit stays valid after the button press.
pub const PERMIT_WINDOW: Duration = Duration::from_secs(60);

/// One discovered infrared-blaster unit.
///
/// Liveness is transient: it is serde-skipped so the persisted cache never
/// contains it, and it resets on load until live telemetry re-establishes
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable hardware identifier (MAC address string), primary key
    pub uuid: String,

    /// MQTT base topic (the device's configured friendly name), secondary
    /// key
    pub topic: String,

    #[serde(skip)]
    pub lwt: Option<Liveness>,

    /// Last known/applied climate state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irhvac: Option<IrHvac>,
}

/// The persisted view: uuid → record.
pub type DeviceCache = HashMap<String, DeviceRecord>;

/// Device registry for the Tasmota MQTT integration.
pub struct DeviceRegistry<C: MqttClient> {
    client: Arc<Mutex<C>>,

    /// Expected `md` string; discovery payloads for other models are noise
    model: String,

    /// Discovery subscription filter, also the template for the per-device
    /// retained config topic
    discovery_topic: String,

    /// uuid → record, mirrored to disk
    cache: DeviceCache,

    /// topic → uuid, runtime-only alias index
    topics: HashMap<String, String>,

    /// Liveness seen for topics that have not been discovered yet
    placeholders: HashMap<String, Liveness>,

    /// Open pairing windows: uuid → grant time
    permits: HashMap<String, Instant>,

    /// Snapshots for the coalescing store writer
    store_tx: watch::Sender<Option<DeviceCache>>,
}

impl<C: MqttClient> DeviceRegistry<C> {
    pub fn new(
        client: Arc<Mutex<C>>,
        model: String,
        discovery_topic: String,
        store_tx: watch::Sender<Option<DeviceCache>>,
    ) -> Self {
        Self {
            client,
            model,
            discovery_topic,
            cache: DeviceCache::new(),
            topics: HashMap::new(),
            placeholders: HashMap::new(),
            permits: HashMap::new(),
            store_tx,
        }
    }

    /// Adopt a cache loaded from disk. Liveness must be re-learned from
    /// live telemetry, never trusted from storage.
    pub fn load(&mut self, cache: DeviceCache) {
        self.cache = cache;
        self.topics.clear();
        for record in self.cache.values_mut() {
            record.lwt = None;
            self.topics.insert(record.topic.clone(), record.uuid.clone());
        }
        info!("Loaded {} device(s) from cache", self.cache.len());
    }

    /// Look up a record by either of its keys (uuid or topic).
    pub fn find_device(&self, key: &str) -> Option<&DeviceRecord> {
        self.cache
            .get(key)
            .or_else(|| self.topics.get(key).and_then(|uuid| self.cache.get(uuid)))
    }

    fn resolve_uuid(&self, key: &str) -> Option<String> {
        self.find_device(key).map(|record| record.uuid.clone())
    }

    /// Hand the latest cache snapshot to the store writer. The wholesale
    /// rewrite is cheap at this scale and keeps crash recovery trivial.
    fn persist(&self) {
        self.store_tx.send_replace(Some(self.cache.clone()));
    }

    /// Handle a message on the discovery topic.
    ///
    /// Unrelated Tasmota devices share this topic; payloads missing `mac`,
    /// `t`, or `md`, or with a different model, are dropped without
    /// comment. Known devices are re-announced so facets can be rebuilt
    /// after a restart.
    pub fn handle_discovery(&mut self, payload: &[u8]) -> Vec<FromIntegrationMessage> {
        let Ok(discovery) = serde_json::from_slice::<DiscoveryPayload>(payload) else {
            return Vec::new();
        };
        let (Some(mac), Some(topic), Some(md)) = (discovery.mac, discovery.t, discovery.md) else {
            return Vec::new();
        };
        if md != self.model {
            return Vec::new();
        }

        if !self.cache.contains_key(&mac) {
            info!("Device discovery {}", mac);

            // A device can announce liveness before it announces itself
            let lwt = self.placeholders.remove(&topic);
            self.cache.insert(
                mac.clone(),
                DeviceRecord {
                    uuid: mac.clone(),
                    topic: topic.clone(),
                    lwt,
                    irhvac: None,
                },
            );
            self.topics.insert(topic, mac.clone());
            self.persist();
        }

        let record = &self.cache[&mac];
        vec![FromIntegrationMessage::DeviceDiscovered {
            seed: DeviceSeed {
                uuid: record.uuid.clone(),
                topic: record.topic.clone(),
                lwt: record.lwt,
                irhvac: record.irhvac.clone(),
                ip: discovery.ip,
                hostname: discovery.hn,
                sw_version: discovery.sw,
            },
            integration_name: INTEGRATION_NAME.to_string(),
        }]
    }

    /// Handle a `stat/<topic>/<verb>` message: the device echoing the
    /// climate state it applied after a command.
    pub fn handle_stat(
        &mut self,
        device_topic: &str,
        verb: &str,
        payload: &[u8],
    ) -> Vec<FromIntegrationMessage> {
        let Some(uuid) = self.topics.get(device_topic).cloned() else {
            return Vec::new();
        };
        if verb != "RESULT" {
            return Vec::new();
        }

        let Some(irhvac) = extract_irhvac(payload, &["IRHVAC"]) else {
            return Vec::new();
        };

        debug!("Applied state echo from {}", uuid);
        if let Some(record) = self.cache.get_mut(&uuid) {
            record.irhvac = Some(irhvac.clone());
        }
        self.persist();

        vec![FromIntegrationMessage::HvacStateChanged { uuid, irhvac }]
    }

    /// Handle a `tele/<topic>/<verb>` message: liveness heartbeats and
    /// IR-learn results.
    pub async fn handle_tele(
        &mut self,
        device_topic: &str,
        verb: &str,
        payload: &[u8],
    ) -> Vec<FromIntegrationMessage> {
        let Some(uuid) = self.topics.get(device_topic).cloned() else {
            // Track liveness for devices we have not discovered yet; they
            // are promoted to full records when discovery arrives.
            if verb == "LWT" {
                let lwt = Liveness::from_payload(payload);
                debug!("Liveness for undiscovered topic {}: {}", device_topic, lwt);
                self.placeholders.insert(device_topic.to_string(), lwt);
            }
            return Vec::new();
        };

        match verb {
            "LWT" => {
                let lwt = Liveness::from_payload(payload);
                let Some(record) = self.cache.get_mut(&uuid) else {
                    return Vec::new();
                };
                if record.lwt == Some(lwt) {
                    return Vec::new();
                }
                record.lwt = Some(lwt);
                self.persist();
                vec![FromIntegrationMessage::LivenessChanged { uuid, lwt }]
            }
            "RESULT" => {
                let Some(irhvac) = extract_irhvac(payload, &["IrReceived", "IRHVAC"]) else {
                    return Vec::new();
                };
                self.apply_learned(&uuid, irhvac).await
            }
            _ => Vec::new(),
        }
    }

    /// Apply a freshly learned remote code, but only inside an open
    /// pairing window. The blaster passively receives ambient IR signals
    /// at all times; without the permit gate every stray remote press
    /// nearby would rewrite the stored state.
    async fn apply_learned(&mut self, uuid: &str, irhvac: IrHvac) -> Vec<FromIntegrationMessage> {
        match self.permits.get(uuid) {
            None => {
                debug!("No pairing window open for {}, ignoring learned code", uuid);
                return Vec::new();
            }
            Some(granted) if granted.elapsed() > PERMIT_WINDOW => {
                debug!("Pairing window for {} expired, ignoring learned code", uuid);
                return Vec::new();
            }
            Some(_) => {}
        }
        self.permits.remove(uuid);

        info!("Learned remote code for {}", uuid);
        if let Some(record) = self.cache.get_mut(uuid) {
            record.irhvac = Some(irhvac.clone());
        }
        self.persist();

        // Echo the command back so the device applies what it just
        // reported; the learn cycle round-trips through us.
        self.cmnd_irhvac(uuid).await;

        vec![FromIntegrationMessage::HvacStateChanged {
            uuid: uuid.to_string(),
            irhvac,
        }]
    }

    /// Open the pairing window for a device. Expired windows for other
    /// devices are swept here so abandoned permits do not pile up.
    pub fn grant_permit(&mut self, key: &str) -> bool {
        let Some(uuid) = self.resolve_uuid(key) else {
            return false;
        };

        let now = Instant::now();
        self.permits
            .retain(|_, granted| now.duration_since(*granted) <= PERMIT_WINDOW);

        info!("{} start binding", uuid);
        self.permits.insert(uuid, now);
        true
    }

    /// Publish the device's stored climate state as the fixed six-field
    /// IRHVAC command.
    pub async fn cmnd_irhvac(&self, key: &str) {
        let Some(record) = self.find_device(key) else {
            return;
        };
        let Some(irhvac) = &record.irhvac else {
            debug!("No stored IRHVAC state for {}, nothing to send", record.uuid);
            return;
        };

        let topic = format!("cmnd/{}/IRHVAC", record.topic);
        let payload = irhvac.command_payload().to_string();
        self.publish(&topic, payload.as_bytes(), false).await;
    }

    /// Generic single-field command passthrough, e.g. `Reset`.
    pub async fn command(&self, key: &str, cmnd: &str, payload: &[u8]) {
        let Some(record) = self.find_device(key) else {
            return;
        };

        let topic = format!("cmnd/{}/{}", record.topic, cmnd);
        self.publish(&topic, payload, false).await;
    }

    /// Remove a device: reset the hardware, clear its retained discovery
    /// state so Tasmota does not re-announce it, and drop it from the
    /// cache and both index keys. Returns the resolved uuid on success,
    /// None (with zero side effects) for unknown devices.
    pub async fn remove_device(&mut self, key: &str) -> Option<String> {
        let (uuid, topic) = {
            let record = self.find_device(key)?;
            (record.uuid.clone(), record.topic.clone())
        };

        info!("Removing device {} ({})", uuid, topic);

        self.command(&uuid, "Reset", b"1").await;

        let config_topic = discovery_config_topic(&self.discovery_topic, &uuid);
        self.publish(&config_topic, b"", true).await;

        self.cache.remove(&uuid);
        self.topics.remove(&topic);
        self.permits.remove(&uuid);
        self.persist();

        Some(uuid)
    }

    /// Set the HVAC operating mode and send the updated state to the
    /// device. Off also turns Power off.
    pub async fn set_hvac_mode(&mut self, key: &str, mode: HvacMode) {
        let Some(uuid) = self.resolve_uuid(key) else {
            return;
        };
        let Some(irhvac) = self.cache.get_mut(&uuid).and_then(|r| r.irhvac.as_mut()) else {
            return;
        };

        if mode == HvacMode::Off {
            irhvac.power = "Off".to_string();
            irhvac.mode = "Off".to_string();
        } else {
            irhvac.power = "On".to_string();
            irhvac.mode = mode.vendor_name().to_string();
        }

        self.cmnd_irhvac(&uuid).await;
    }

    /// Set the fan speed. The command is only sent while the device is in
    /// an active mode; an off unit just remembers the new speed.
    pub async fn set_fan_mode(&mut self, key: &str, fan: FanMode) {
        let Some(uuid) = self.resolve_uuid(key) else {
            return;
        };
        let Some(irhvac) = self.cache.get_mut(&uuid).and_then(|r| r.irhvac.as_mut()) else {
            return;
        };

        irhvac.fan_speed = fan.vendor_name().to_string();
        let active = HvacMode::from_vendor(&irhvac.mode) != HvacMode::Off;

        if active {
            self.cmnd_irhvac(&uuid).await;
        }
    }

    /// Set the target temperature (degrees Celsius). Same send rule as
    /// `set_fan_mode`.
    pub async fn set_temperature(&mut self, key: &str, temp: f64) {
        let Some(uuid) = self.resolve_uuid(key) else {
            return;
        };
        let Some(irhvac) = self.cache.get_mut(&uuid).and_then(|r| r.irhvac.as_mut()) else {
            return;
        };

        irhvac.celsius = "On".to_string();
        irhvac.temp = temp;
        let active = HvacMode::from_vendor(&irhvac.mode) != HvacMode::Off;

        if active {
            self.cmnd_irhvac(&uuid).await;
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) {
        let mut client = self.client.lock().await;
        if let Err(e) = client.publish(topic, payload, retain).await {
            warn!("MQTT publish to {} failed: {}", topic, e);
        }
    }
}

/// Dig a nested IRHVAC object out of a JSON payload. The payload may
/// legitimately be plain text (IR results can be bare strings), so parse
/// failures just mean "not for us".
fn extract_irhvac(payload: &[u8], path: &[&str]) -> Option<IrHvac> {
    let value = serde_json::from_slice::<serde_json::Value>(payload).ok()?;
    let mut node = &value;
    for key in path {
        node = node.get(key)?;
    }
    serde_json::from_value(node.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::super::client::MockMqttClient;
    use super::*;

    const DISCOVERY: &[u8] = br#"{"mac":"AA:BB","t":"ir1","md":"Athom lR Remote","ip":"192.0.2.10","hn":"athom-ir","sw":"13.2.0"}"#;
    const STAT_IRHVAC: &[u8] = br#"{"IRHVAC":{"Vendor":"GREE","Power":"On","Mode":"Cool","FanSpeed":"Auto","Celsius":"On","Temp":24}}"#;
    const TELE_LEARNED: &[u8] = br#"{"IrReceived":{"IRHVAC":{"Vendor":"GREE","Power":"On","Mode":"Heat","FanSpeed":"Min","Celsius":"On","Temp":22}}}"#;

    struct Fixture {
        registry: DeviceRegistry<MockMqttClient>,
        client: Arc<Mutex<MockMqttClient>>,
        store_rx: watch::Receiver<Option<DeviceCache>>,
    }

    fn fixture() -> Fixture {
        let client = Arc::new(Mutex::new(MockMqttClient::new()));
        let (store_tx, store_rx) = watch::channel(None);
        let registry = DeviceRegistry::new(
            client.clone(),
            "Athom lR Remote".to_string(),
            "tasmota/discovery/+/config".to_string(),
            store_tx,
        );
        Fixture {
            registry,
            client,
            store_rx,
        }
    }

    impl Fixture {
        fn persisted(&mut self) -> bool {
            let changed = self.store_rx.has_changed().unwrap();
            self.store_rx.borrow_and_update();
            changed
        }

        async fn published(&self) -> Vec<(String, Vec<u8>, bool)> {
            self.client.lock().await.published.clone()
        }
    }

    #[tokio::test]
    async fn test_discovery_rejects_incomplete_payloads() {
        let mut f = fixture();

        for payload in [
            br#"{"t":"ir1","md":"Athom lR Remote"}"#.as_slice(),
            br#"{"mac":"AA:BB","md":"Athom lR Remote"}"#.as_slice(),
            br#"{"mac":"AA:BB","t":"ir1"}"#.as_slice(),
            br#"{"mac":"AA:BB","t":"ir1","md":"Sonoff Basic"}"#.as_slice(),
            br#"not json"#.as_slice(),
            br#"[1,2,3]"#.as_slice(),
        ] {
            let events = f.registry.handle_discovery(payload);
            assert!(events.is_empty(), "payload should be ignored");
        }

        assert!(f.registry.find_device("AA:BB").is_none());
        assert!(!f.persisted());
    }

    #[tokio::test]
    async fn test_discovery_creates_record_under_both_keys() {
        let mut f = fixture();

        let events = f.registry.handle_discovery(DISCOVERY);
        assert_eq!(events.len(), 1);
        match &events[0] {
            FromIntegrationMessage::DeviceDiscovered { seed, .. } => {
                assert_eq!(seed.uuid, "AA:BB");
                assert_eq!(seed.topic, "ir1");
                assert_eq!(seed.lwt, None);
                assert_eq!(seed.ip.as_deref(), Some("192.0.2.10"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let by_uuid = f.registry.find_device("AA:BB").unwrap();
        let by_topic = f.registry.find_device("ir1").unwrap();
        assert_eq!(by_uuid, by_topic);
        assert!(f.persisted());
    }

    #[tokio::test]
    async fn test_rediscovery_reemits_without_persisting() {
        let mut f = fixture();

        f.registry.handle_discovery(DISCOVERY);
        assert!(f.persisted());

        let events = f.registry.handle_discovery(DISCOVERY);
        assert_eq!(events.len(), 1, "known devices are re-announced");
        assert!(!f.persisted(), "rediscovery must not rewrite the cache");
    }

    #[tokio::test]
    async fn test_lwt_before_discovery_seeds_the_record() {
        let mut f = fixture();

        let events = f.registry.handle_tele("ir1", "LWT", b"Online").await;
        assert!(events.is_empty(), "placeholders update silently");
        assert!(!f.persisted());

        let events = f.registry.handle_discovery(DISCOVERY);
        match &events[0] {
            FromIntegrationMessage::DeviceDiscovered { seed, .. } => {
                assert_eq!(seed.lwt, Some(Liveness::Online));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lwt_emits_only_on_change() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.persisted();

        let events = f.registry.handle_tele("ir1", "LWT", b"Online").await;
        assert_eq!(events.len(), 1);
        assert!(f.persisted());

        let events = f.registry.handle_tele("ir1", "LWT", b"Online").await;
        assert!(events.is_empty(), "identical liveness is idempotent");
        assert!(!f.persisted());

        let events = f.registry.handle_tele("ir1", "LWT", b"Offline").await;
        assert_eq!(events.len(), 1);
        assert!(f.persisted());
    }

    #[tokio::test]
    async fn test_stat_result_replaces_irhvac() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.persisted();

        let events = f.registry.handle_stat("ir1", "RESULT", STAT_IRHVAC);
        assert_eq!(events.len(), 1);
        match &events[0] {
            FromIntegrationMessage::HvacStateChanged { uuid, irhvac } => {
                assert_eq!(uuid, "AA:BB");
                assert_eq!(irhvac.mode, "Cool");
                assert_eq!(irhvac.temp, 24.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let record = f.registry.find_device("AA:BB").unwrap();
        assert_eq!(record.irhvac.as_ref().unwrap().vendor, "GREE");
        assert!(f.persisted());
    }

    #[tokio::test]
    async fn test_stat_ignores_noise() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.persisted();

        // Unknown device
        assert!(f.registry.handle_stat("other", "RESULT", STAT_IRHVAC).is_empty());
        // Wrong verb
        assert!(f.registry.handle_stat("ir1", "STATUS", STAT_IRHVAC).is_empty());
        // Plain-text IR result payload
        assert!(f.registry.handle_stat("ir1", "RESULT", b"ON").is_empty());
        // JSON without IRHVAC
        assert!(f.registry.handle_stat("ir1", "RESULT", br#"{"POWER":"ON"}"#).is_empty());

        assert!(!f.persisted());
    }

    #[tokio::test]
    async fn test_learned_code_requires_permit() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.persisted();

        let events = f.registry.handle_tele("ir1", "RESULT", TELE_LEARNED).await;
        assert!(events.is_empty(), "ambient IR without a permit is noise");
        assert!(f.published().await.is_empty());
        assert!(!f.persisted());
    }

    #[tokio::test]
    async fn test_learned_code_consumes_permit_and_echoes() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.persisted();

        assert!(f.registry.grant_permit("AA:BB"));

        let events = f.registry.handle_tele("ir1", "RESULT", TELE_LEARNED).await;
        assert_eq!(events.len(), 1);
        assert!(f.persisted());

        // The learn cycle round-trips: the device is told to apply what it
        // just reported.
        let published = f.published().await;
        assert_eq!(published.len(), 1);
        let (topic, payload, retain) = &published[0];
        assert_eq!(topic, "cmnd/ir1/IRHVAC");
        assert!(!retain);
        let body: serde_json::Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(body["Mode"], "Heat");
        assert_eq!(body["Temp"], 22.0);
        assert_eq!(body.as_object().unwrap().len(), 6);

        // The permit is gone; the identical message is now ignored.
        let events = f.registry.handle_tele("ir1", "RESULT", TELE_LEARNED).await;
        assert!(events.is_empty());
        assert!(!f.persisted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_expires_after_window() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.persisted();

        assert!(f.registry.grant_permit("AA:BB"));
        tokio::time::advance(Duration::from_secs(61)).await;

        let events = f.registry.handle_tele("ir1", "RESULT", TELE_LEARNED).await;
        assert!(events.is_empty(), "stale permits are ignored");
        assert!(!f.persisted());

        // Re-granting opens a fresh window.
        assert!(f.registry.grant_permit("AA:BB"));
        let events = f.registry.handle_tele("ir1", "RESULT", TELE_LEARNED).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_grant_permit_unknown_device() {
        let mut f = fixture();
        assert!(!f.registry.grant_permit("nope"));
    }

    #[tokio::test]
    async fn test_remove_unknown_device_has_no_side_effects() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.persisted();

        assert!(f.registry.remove_device("CC:DD").await.is_none());
        assert!(f.published().await.is_empty());
        assert!(!f.persisted());
    }

    #[tokio::test]
    async fn test_remove_device_resets_and_clears_retained_discovery() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.persisted();

        assert_eq!(f.registry.remove_device("AA:BB").await.as_deref(), Some("AA:BB"));

        let published = f.published().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "cmnd/ir1/Reset");
        assert_eq!(published[0].1, b"1");
        assert_eq!(published[1].0, "tasmota/discovery/AA:BB/config");
        assert!(published[1].1.is_empty());
        assert!(published[1].2, "discovery clear must be retained");

        assert!(f.registry.find_device("AA:BB").is_none());
        assert!(f.registry.find_device("ir1").is_none());
        assert!(f.persisted());
        assert!(f.store_rx.borrow().as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_roundtrip_resets_liveness() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.registry.handle_stat("ir1", "RESULT", STAT_IRHVAC);
        f.registry.handle_tele("ir1", "LWT", b"Online").await;

        // Serialize the persisted snapshot and load it into a fresh
        // registry, as a restart would.
        let snapshot = f.store_rx.borrow().clone().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("Online"), "liveness must not be persisted");

        let reloaded: DeviceCache = serde_json::from_str(&json).unwrap();
        let mut f2 = fixture();
        f2.registry.load(reloaded);

        let record = f2.registry.find_device("AA:BB").unwrap();
        assert_eq!(record.lwt, None);
        assert_eq!(record.irhvac.as_ref().unwrap().vendor, "GREE");
        assert_eq!(f2.registry.find_device("ir1").unwrap(), record);
    }

    #[tokio::test]
    async fn test_set_hvac_mode_off_turns_power_off() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.registry.handle_stat("ir1", "RESULT", STAT_IRHVAC);

        f.registry.set_hvac_mode("AA:BB", HvacMode::Off).await;

        let record = f.registry.find_device("AA:BB").unwrap();
        let irhvac = record.irhvac.as_ref().unwrap();
        assert_eq!(irhvac.power, "Off");
        assert_eq!(irhvac.mode, "Off");

        let published = f.published().await;
        assert_eq!(published.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(body["Power"], "Off");
    }

    #[tokio::test]
    async fn test_set_fan_mode_while_off_does_not_send() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.registry.handle_stat("ir1", "RESULT", STAT_IRHVAC);
        f.registry.set_hvac_mode("AA:BB", HvacMode::Off).await;
        let sends_before = f.published().await.len();

        f.registry.set_fan_mode("AA:BB", FanMode::High).await;

        let irhvac = f
            .registry
            .find_device("AA:BB")
            .unwrap()
            .irhvac
            .clone()
            .unwrap();
        assert_eq!(irhvac.fan_speed, "high");
        assert_eq!(
            f.published().await.len(),
            sends_before,
            "an off unit only remembers the new speed"
        );
    }

    #[tokio::test]
    async fn test_set_temperature_sends_while_active() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.registry.handle_stat("ir1", "RESULT", STAT_IRHVAC);

        f.registry.set_temperature("AA:BB", 21.0).await;

        let irhvac = f
            .registry
            .find_device("AA:BB")
            .unwrap()
            .irhvac
            .clone()
            .unwrap();
        assert_eq!(irhvac.temp, 21.0);
        assert_eq!(irhvac.celsius, "On");

        let published = f.published().await;
        assert_eq!(published.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(body["Temp"], 21.0);
    }

    #[tokio::test]
    async fn test_cmnd_irhvac_without_stored_state_is_a_noop() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);

        f.registry.cmnd_irhvac("AA:BB").await;
        assert!(f.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_commands_resolve_topic_alias() {
        let mut f = fixture();
        f.registry.handle_discovery(DISCOVERY);
        f.registry.handle_stat("ir1", "RESULT", STAT_IRHVAC);

        // The topic is as good a key as the uuid.
        f.registry.set_hvac_mode("ir1", HvacMode::Heat).await;

        let irhvac = f
            .registry
            .find_device("AA:BB")
            .unwrap()
            .irhvac
            .clone()
            .unwrap();
        assert_eq!(irhvac.mode, "Heat");
        assert_eq!(irhvac.power, "On");
    }
}

use serde::Deserialize;

/// Discovery payload published by Tasmota on `tasmota/discovery/<mac>/config`.
///
/// Tasmota publishes one of these (retained) per device; the discovery topic
/// is shared by every Tasmota device on the broker, so all fields are
/// optional and validation happens in the registry. Only the fields we act
/// on are listed; the rest of the payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryPayload {
    /// MAC address, the device's stable identifier
    pub mac: Option<String>,

    /// Configured topic (friendly name)
    pub t: Option<String>,

    /// Model string, e.g. "Athom lR Remote"
    pub md: Option<String>,

    /// IP address
    pub ip: Option<String>,

    /// Hostname
    pub hn: Option<String>,

    /// Firmware version
    pub sw: Option<String>,
}

/// Split a Tasmota `stat`/`tele` topic into (prefix, device topic, verb).
///
/// Topic format: `<prefix>/<topic>/<verb>`, e.g. `tele/ir1/LWT`. Anything
/// after the verb is ignored, matching how the devices publish.
pub fn split_topic(topic: &str) -> Option<(&str, &str, &str)> {
    let mut parts = topic.split('/');
    let prefix = parts.next()?;
    let device_topic = parts.next()?;
    let verb = parts.next()?;
    Some((prefix, device_topic, verb))
}

/// Match an MQTT topic against a subscription filter (`+` single level,
/// `#` multi level).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// The device-specific discovery config topic, derived from the filter by
/// substituting the device id for the wildcard. Used to clear retained
/// discovery state on removal.
pub fn discovery_config_topic(filter: &str, uuid: &str) -> String {
    filter.replacen('+', uuid, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_topic() {
        assert_eq!(split_topic("tele/ir1/LWT"), Some(("tele", "ir1", "LWT")));
        assert_eq!(
            split_topic("stat/ir1/RESULT"),
            Some(("stat", "ir1", "RESULT"))
        );
        assert_eq!(split_topic("stat/ir1"), None);
    }

    #[test]
    fn test_topic_matches_single_level() {
        assert!(topic_matches(
            "tasmota/discovery/+/config",
            "tasmota/discovery/AABBCC/config"
        ));
        assert!(!topic_matches(
            "tasmota/discovery/+/config",
            "tasmota/discovery/AABBCC/sensors"
        ));
        assert!(!topic_matches(
            "tasmota/discovery/+/config",
            "tasmota/discovery/config"
        ));
    }

    #[test]
    fn test_topic_matches_multi_level() {
        assert!(topic_matches("stat/#", "stat/ir1/RESULT"));
        assert!(topic_matches("tele/#", "tele/ir1/LWT"));
        assert!(!topic_matches("stat/#", "tele/ir1/LWT"));
    }

    #[test]
    fn test_discovery_config_topic() {
        assert_eq!(
            discovery_config_topic("tasmota/discovery/+/config", "AA:BB"),
            "tasmota/discovery/AA:BB/config"
        );
    }

    #[test]
    fn test_discovery_payload_ignores_unknown_fields() {
        let payload = r#"{
            "ip": "192.0.2.10",
            "dn": "Athom IR",
            "hn": "athom-ir-4711",
            "mac": "AABBCCDDEEFF",
            "md": "Athom lR Remote",
            "t": "ir1",
            "sw": "13.2.0",
            "ofln": "Offline",
            "onln": "Online"
        }"#;

        let discovery: DiscoveryPayload = serde_json::from_str(payload).unwrap();
        assert_eq!(discovery.mac.as_deref(), Some("AABBCCDDEEFF"));
        assert_eq!(discovery.t.as_deref(), Some("ir1"));
        assert_eq!(discovery.md.as_deref(), Some("Athom lR Remote"));
    }
}

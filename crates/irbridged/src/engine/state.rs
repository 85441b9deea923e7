//! Shared state vocabulary for devices and facets.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Device liveness, learned from `tele/<topic>/LWT`.
///
/// Tasmota publishes the literal strings `Online` and `Offline`; anything
/// else on the LWT topic is treated as Offline. Liveness is transient and
/// never persisted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum Liveness {
    Online,
    Offline,
}

impl Liveness {
    pub fn from_payload(payload: &[u8]) -> Self {
        if payload == b"Online" {
            Liveness::Online
        } else {
            Liveness::Offline
        }
    }

    pub fn is_online(self) -> bool {
        self == Liveness::Online
    }
}

/// The last known/applied IRHVAC state of a device.
///
/// Tasmota reports many more fields than we act on (Model, SwingV, Quiet,
/// Turbo, ...); those are retained verbatim in `extra` so persistence does
/// not lose them. Commands reconstruct the fixed six-field payload only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IrHvac {
    #[serde(default)]
    pub vendor: String,

    #[serde(default)]
    pub power: String,

    #[serde(default)]
    pub mode: String,

    #[serde(default)]
    pub fan_speed: String,

    #[serde(default)]
    pub celsius: String,

    #[serde(default)]
    pub temp: f64,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IrHvac {
    /// The six-field payload published to `cmnd/<topic>/IRHVAC`.
    pub fn command_payload(&self) -> serde_json::Value {
        json!({
            "Vendor": self.vendor,
            "Power": self.power,
            "Mode": self.mode,
            "FanSpeed": self.fan_speed,
            "Celsius": self.celsius,
            "Temp": self.temp,
        })
    }

    /// Whether the reported `Power` field means "off".
    pub fn power_is_off(&self) -> bool {
        matches!(
            self.power.to_lowercase().as_str(),
            "off" | "no" | "false" | "0"
        )
    }
}

/// HVAC operating mode, the climate facet's view of `IrHvac::mode`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HvacMode {
    Off,
    Auto,
    Cool,
    Heat,
    Dry,
    FanOnly,
}

impl HvacMode {
    /// Map a vendor mode string to a mode, accepting the synonyms different
    /// IR vendors report. Unknown strings mean Off.
    pub fn from_vendor(mode: &str) -> Self {
        match mode.to_lowercase().as_str() {
            "auto" | "automatic" => HvacMode::Auto,
            "cool" | "cooling" => HvacMode::Cool,
            "heat" | "heating" => HvacMode::Heat,
            "dry" | "drying" | "dehumidify" => HvacMode::Dry,
            "fan" | "fanonly" | "fan_only" => HvacMode::FanOnly,
            _ => HvacMode::Off,
        }
    }

    /// The `Mode` string sent back to the device.
    pub fn vendor_name(self) -> &'static str {
        match self {
            HvacMode::Off => "Off",
            HvacMode::Auto => "Auto",
            HvacMode::Cool => "Cool",
            HvacMode::Heat => "Heat",
            HvacMode::Dry => "Dry",
            HvacMode::FanOnly => "Fan",
        }
    }
}

/// Fan speed, the climate facet's view of `IrHvac::fan_speed`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FanMode {
    Auto,
    Low,
    Medium,
    High,
}

impl FanMode {
    /// Map a vendor fan-speed string to a fan mode. Unknown strings mean
    /// Auto.
    pub fn from_vendor(speed: &str) -> Self {
        match speed.to_lowercase().as_str() {
            "1" | "2" | "min" | "minimum" | "lowest" | "low" => FanMode::Low,
            "3" | "mid" | "med" | "medium" => FanMode::Medium,
            "4" | "5" | "hi" | "high" | "max" | "maximum" | "highest" => FanMode::High,
            _ => FanMode::Auto,
        }
    }

    /// The `FanSpeed` string sent back to the device.
    pub fn vendor_name(self) -> &'static str {
        match self {
            FanMode::Auto => "auto",
            FanMode::Low => "low",
            FanMode::Medium => "medium",
            FanMode::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_from_payload() {
        assert_eq!(Liveness::from_payload(b"Online"), Liveness::Online);
        assert_eq!(Liveness::from_payload(b"Offline"), Liveness::Offline);
        assert_eq!(Liveness::from_payload(b"garbage"), Liveness::Offline);
    }

    #[test]
    fn test_irhvac_parses_pascal_case_and_keeps_extras() {
        let payload = r#"{
            "Vendor": "GREE",
            "Power": "On",
            "Mode": "Cool",
            "FanSpeed": "Auto",
            "Celsius": "On",
            "Temp": 24,
            "SwingV": "Auto",
            "Quiet": "Off"
        }"#;

        let irhvac: IrHvac = serde_json::from_str(payload).unwrap();
        assert_eq!(irhvac.vendor, "GREE");
        assert_eq!(irhvac.temp, 24.0);
        assert_eq!(irhvac.extra["SwingV"], "Auto");

        let reserialized = serde_json::to_value(&irhvac).unwrap();
        assert_eq!(reserialized["FanSpeed"], "Auto");
        assert_eq!(reserialized["Quiet"], "Off");
    }

    #[test]
    fn test_command_payload_has_exactly_six_fields() {
        let irhvac = IrHvac {
            vendor: "GREE".to_string(),
            power: "On".to_string(),
            mode: "Cool".to_string(),
            fan_speed: "Auto".to_string(),
            celsius: "On".to_string(),
            temp: 24.0,
            extra: serde_json::Map::from_iter([(
                "SwingV".to_string(),
                serde_json::Value::String("Auto".to_string()),
            )]),
        };

        let payload = irhvac.command_payload();
        let obj = payload.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert!(obj.get("SwingV").is_none());
        assert_eq!(obj["Temp"], 24.0);
    }

    #[test]
    fn test_power_off_synonyms() {
        for power in ["Off", "off", "No", "false", "0"] {
            let irhvac = IrHvac {
                power: power.to_string(),
                ..Default::default()
            };
            assert!(irhvac.power_is_off(), "{power} should mean off");
        }

        let irhvac = IrHvac {
            power: "On".to_string(),
            ..Default::default()
        };
        assert!(!irhvac.power_is_off());
    }

    #[test]
    fn test_hvac_mode_synonyms() {
        assert_eq!(HvacMode::from_vendor("Cooling"), HvacMode::Cool);
        assert_eq!(HvacMode::from_vendor("dehumidify"), HvacMode::Dry);
        assert_eq!(HvacMode::from_vendor("fan_only"), HvacMode::FanOnly);
        assert_eq!(HvacMode::from_vendor("stop"), HvacMode::Off);
        assert_eq!(HvacMode::from_vendor("???"), HvacMode::Off);
    }

    #[test]
    fn test_fan_mode_synonyms() {
        assert_eq!(FanMode::from_vendor("1"), FanMode::Low);
        assert_eq!(FanMode::from_vendor("Med"), FanMode::Medium);
        assert_eq!(FanMode::from_vendor("maximum"), FanMode::High);
        assert_eq!(FanMode::from_vendor("automatic"), FanMode::Auto);
        assert_eq!(FanMode::from_vendor("???"), FanMode::Auto);
    }
}

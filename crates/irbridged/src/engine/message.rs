//! Type-safe message system for irbridged
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use serde::Serialize;

use super::state::{FanMode, HvacMode, IrHvac, Liveness};

/// Snapshot of a device at discovery time, used to seed its facets.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSeed {
    /// Stable hardware identifier (MAC address string)
    pub uuid: String,

    /// MQTT base topic (the device's configured friendly name)
    pub topic: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lwt: Option<Liveness>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub irhvac: Option<IrHvac>,

    /// IP address from the discovery payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Hostname from the discovery payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Firmware version from the discovery payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// A device announced itself on the discovery topic. Re-emitted even for
    /// already-known devices so facets can be re-materialized after a
    /// restart.
    DeviceDiscovered {
        seed: DeviceSeed,
        integration_name: String,
    },

    /// The device's applied IRHVAC state changed (command echo or a freshly
    /// learned remote code)
    HvacStateChanged { uuid: String, irhvac: IrHvac },

    /// The device's LWT liveness changed
    LivenessChanged { uuid: String, lwt: Liveness },

    /// The device was removed at the user's request
    DeviceRemoved { uuid: String },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone)]
pub enum ToIntegrationMessage {
    /// Set the HVAC operating mode (Off also turns Power off)
    SetHvacMode { uuid: String, mode: HvacMode },

    /// Set the fan speed
    SetFanMode { uuid: String, fan: FanMode },

    /// Set the target temperature in degrees Celsius
    SetTemperature { uuid: String, temp: f64 },

    /// Open the 60-second pairing window for the device's next learned IR
    /// code
    StartPairing { uuid: String },

    /// Reset the physical device, clear its retained discovery state, and
    /// drop it from the registry
    RemoveDevice { uuid: String },
}

impl ToIntegrationMessage {
    /// The device this command targets, used for routing.
    pub fn uuid(&self) -> &str {
        match self {
            ToIntegrationMessage::SetHvacMode { uuid, .. }
            | ToIntegrationMessage::SetFanMode { uuid, .. }
            | ToIntegrationMessage::SetTemperature { uuid, .. }
            | ToIntegrationMessage::StartPairing { uuid }
            | ToIntegrationMessage::RemoveDevice { uuid } => uuid,
        }
    }
}

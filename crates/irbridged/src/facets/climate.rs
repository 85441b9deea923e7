use serde_json::json;

use super::Facet;
use crate::engine::DeviceEvent;
use crate::engine::message::DeviceSeed;
use crate::engine::state::{FanMode, HvacMode, IrHvac, Liveness};

pub const MIN_TEMP: f64 = 16.0;
pub const MAX_TEMP: f64 = 30.0;
const DEFAULT_TARGET_TEMP: f64 = 26.0;

/// Climate facet mirroring the device's applied IRHVAC state.
///
/// Unavailable until the device has reported at least one IRHVAC state;
/// going offline makes it unavailable, coming back online restores it only
/// if a state is known.
#[derive(Debug, Clone)]
pub struct ClimateFacet {
    available: bool,
    has_state: bool,
    hvac_mode: HvacMode,
    fan_mode: FanMode,
    target_temperature: f64,
}

impl ClimateFacet {
    pub fn new(seed: &DeviceSeed) -> Self {
        let mut facet = Self {
            available: false,
            has_state: false,
            hvac_mode: HvacMode::Auto,
            fan_mode: FanMode::Auto,
            target_temperature: DEFAULT_TARGET_TEMP,
        };

        if let Some(irhvac) = &seed.irhvac {
            facet.apply(irhvac);
        }

        facet
    }

    fn apply(&mut self, irhvac: &IrHvac) {
        self.available = true;
        self.has_state = true;

        self.hvac_mode = if irhvac.power_is_off() {
            HvacMode::Off
        } else {
            HvacMode::from_vendor(&irhvac.mode)
        };
        self.fan_mode = FanMode::from_vendor(&irhvac.fan_speed);
        self.target_temperature = irhvac.temp;
    }

    pub fn hvac_mode(&self) -> HvacMode {
        self.hvac_mode
    }

    pub fn fan_mode(&self) -> FanMode {
        self.fan_mode
    }

    pub fn available(&self) -> bool {
        self.available
    }
}

impl Facet for ClimateFacet {
    fn platform(&self) -> &'static str {
        "climate"
    }

    fn object_id(&self) -> &'static str {
        "climate_irhvac"
    }

    fn handle_event(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::Set(irhvac) => self.apply(irhvac),
            DeviceEvent::Lwt(lwt) => {
                self.available = match lwt {
                    Liveness::Online => self.has_state,
                    Liveness::Offline => false,
                };
            }
            DeviceEvent::Removed => {}
        }
    }

    fn state_json(&self) -> serde_json::Value {
        json!({
            "available": self.available,
            "hvac_mode": self.hvac_mode,
            "fan_mode": self.fan_mode,
            "target_temperature": self.target_temperature,
            "min_temp": MIN_TEMP,
            "max_temp": MAX_TEMP,
        })
    }
}

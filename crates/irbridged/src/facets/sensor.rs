use serde_json::json;

use super::Facet;
use crate::engine::DeviceEvent;
use crate::engine::message::DeviceSeed;

/// Diagnostic sensor exposing the IR vendor reported by the device.
#[derive(Debug, Clone)]
pub struct VendorSensorFacet {
    available: bool,
    vendor: Option<String>,
}

impl VendorSensorFacet {
    pub fn new(seed: &DeviceSeed) -> Self {
        Self {
            available: seed.lwt.is_some_and(|lwt| lwt.is_online()),
            vendor: seed.irhvac.as_ref().map(|irhvac| irhvac.vendor.clone()),
        }
    }

    pub fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }
}

impl Facet for VendorSensorFacet {
    fn platform(&self) -> &'static str {
        "sensor"
    }

    fn object_id(&self) -> &'static str {
        "sensor_vendor"
    }

    fn handle_event(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::Lwt(lwt) => self.available = lwt.is_online(),
            DeviceEvent::Set(irhvac) => self.vendor = Some(irhvac.vendor.clone()),
            DeviceEvent::Removed => {}
        }
    }

    fn state_json(&self) -> serde_json::Value {
        json!({
            "available": self.available,
            "vendor": self.vendor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::{IrHvac, Liveness};

    #[test]
    fn test_vendor_tracks_set_events() {
        let seed = DeviceSeed {
            uuid: "AA:BB".to_string(),
            topic: "ir1".to_string(),
            lwt: Some(Liveness::Online),
            irhvac: None,
            ip: None,
            hostname: None,
            sw_version: None,
        };

        let mut facet = VendorSensorFacet::new(&seed);
        assert!(facet.vendor().is_none());

        facet.handle_event(&DeviceEvent::Set(IrHvac {
            vendor: "GREE".to_string(),
            ..Default::default()
        }));
        assert_eq!(facet.vendor(), Some("GREE"));
        assert_eq!(facet.state_json()["vendor"], "GREE");
    }
}

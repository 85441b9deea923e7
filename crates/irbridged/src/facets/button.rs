use serde_json::json;

use super::Facet;
use crate::engine::DeviceEvent;
use crate::engine::message::DeviceSeed;

/// What pressing the button does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// Open the pairing window for the next learned IR code
    Pair,

    /// Reset the device and remove it from the registry
    Reset,
}

/// Pair/reset button facet. Tracks availability only; presses arrive as API
/// actions routed straight to the integration.
#[derive(Debug, Clone)]
pub struct ButtonFacet {
    action: ButtonAction,
    available: bool,
}

impl ButtonFacet {
    pub fn new(seed: &DeviceSeed, action: ButtonAction) -> Self {
        Self {
            action,
            available: seed.lwt.is_some_and(|lwt| lwt.is_online()),
        }
    }

    pub fn available(&self) -> bool {
        self.available
    }
}

impl Facet for ButtonFacet {
    fn platform(&self) -> &'static str {
        "button"
    }

    fn object_id(&self) -> &'static str {
        match self.action {
            ButtonAction::Pair => "button_permit",
            ButtonAction::Reset => "button_reset",
        }
    }

    fn handle_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::Lwt(lwt) = event {
            self.available = lwt.is_online();
        }
    }

    fn state_json(&self) -> serde_json::Value {
        json!({ "available": self.available })
    }
}

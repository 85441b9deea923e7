//! Renderable device facets.
//!
//! Every discovered IR blaster is rendered through a fixed set of facets:
//! a climate surface mirroring the applied IRHVAC state, a vendor sensor,
//! and the pair/reset buttons. Facets hold presentation state only; all
//! mutation flows back through the registry as commands.

mod button;
mod climate;
mod sensor;

pub use button::{ButtonAction, ButtonFacet};
pub use climate::ClimateFacet;
pub use sensor::VendorSensorFacet;

use crate::engine::DeviceEvent;
use crate::engine::message::DeviceSeed;

/// A renderable facet of one device.
pub trait Facet: Send + Sync {
    /// Platform type ("climate", "sensor", "button")
    fn platform(&self) -> &'static str;

    /// Stable per-device object id (e.g. "climate_irhvac", "button_permit")
    fn object_id(&self) -> &'static str;

    /// Apply a device event to the presentation state
    fn handle_event(&mut self, event: &DeviceEvent);

    /// Serialize the current presentation state to JSON
    fn state_json(&self) -> serde_json::Value;
}

/// The full facet set for one device.
pub fn build_facets(seed: &DeviceSeed) -> Vec<Box<dyn Facet>> {
    vec![
        Box::new(ClimateFacet::new(seed)),
        Box::new(VendorSensorFacet::new(seed)),
        Box::new(ButtonFacet::new(seed, ButtonAction::Pair)),
        Box::new(ButtonFacet::new(seed, ButtonAction::Reset)),
    ]
}

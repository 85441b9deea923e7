mod bus;
#[allow(clippy::module_inception)]
mod engine;
mod integration;
pub mod message;
pub mod state;

pub use bus::DeviceBus;
pub use bus::DeviceEvent;
pub use bus::Subscription;
pub use engine::Engine;
pub use engine::EngineError;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;

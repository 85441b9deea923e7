pub mod api;
pub mod config;
pub mod engine;
mod facets;
mod integrations;
mod store;

pub use config::Config;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::IntegrationContext;

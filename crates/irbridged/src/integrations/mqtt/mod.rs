pub mod client;
pub mod discovery;
pub mod registry;
pub mod tasmota;

use linkme::distributed_slice;

use crate::engine::INTEGRATION_REGISTRY;
use crate::engine::IntegrationContext;
use crate::engine::IntegrationFactoryResult;

pub use tasmota::TasmotaIntegration;

pub const INTEGRATION_NAME: &str = "tasmota";

#[distributed_slice(INTEGRATION_REGISTRY)]
static INIT_TASMOTA: fn(&IntegrationContext) -> IntegrationFactoryResult = init_tasmota;

/// Build the Tasmota integration if the config asks for it.
fn init_tasmota(ctx: &IntegrationContext) -> IntegrationFactoryResult {
    let Some(mqtt) = &ctx.config.integrations.mqtt else {
        return Ok(None);
    };

    let client = client::RumqttcClient::new(mqtt)?;
    Ok(Some(Box::new(TasmotaIntegration::new(
        client,
        mqtt,
        &ctx.config.storage.path,
    ))))
}

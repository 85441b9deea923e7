use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::engine::EngineError;
use crate::engine::ToIntegrationMessage;
use crate::engine::state::FanMode;
use crate::engine::state::HvacMode;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Response for accepted device commands
#[derive(Serialize)]
struct CommandResponse {
    status: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct HvacModeRequest {
    mode: HvacMode,
}

#[derive(Deserialize)]
struct FanModeRequest {
    fan: FanMode,
}

#[derive(Deserialize)]
struct TemperatureRequest {
    temp: f64,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/devices
#[tracing::instrument(skip(state))]
async fn devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/devices request");
    (StatusCode::OK, Json(state.engine.state_snapshot()))
}

/// Commands are fire-and-forget one-way infrared sends, so success here
/// means accepted for delivery, not applied.
fn command_response(result: Result<(), EngineError>) -> Response {
    match result {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(CommandResponse {
                status: "accepted".to_string(),
            }),
        )
            .into_response(),
        Err(e @ EngineError::UnknownDevice(_)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
        Err(e @ EngineError::IntegrationGone(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// Handler for POST /v1/devices/:uuid/hvac_mode
#[tracing::instrument(skip(state, req))]
async fn set_hvac_mode(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(req): Json<HvacModeRequest>,
) -> Response {
    command_response(
        state
            .engine
            .send_command(ToIntegrationMessage::SetHvacMode {
                uuid,
                mode: req.mode,
            }),
    )
}

/// Handler for POST /v1/devices/:uuid/fan_mode
#[tracing::instrument(skip(state, req))]
async fn set_fan_mode(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(req): Json<FanModeRequest>,
) -> Response {
    command_response(
        state
            .engine
            .send_command(ToIntegrationMessage::SetFanMode { uuid, fan: req.fan }),
    )
}

/// Handler for POST /v1/devices/:uuid/temperature
#[tracing::instrument(skip(state, req))]
async fn set_temperature(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(req): Json<TemperatureRequest>,
) -> Response {
    command_response(
        state
            .engine
            .send_command(ToIntegrationMessage::SetTemperature {
                uuid,
                temp: req.temp,
            }),
    )
}

/// Handler for POST /v1/devices/:uuid/pair
#[tracing::instrument(skip(state))]
async fn pair(State(state): State<Arc<AppState>>, Path(uuid): Path<String>) -> Response {
    command_response(
        state
            .engine
            .send_command(ToIntegrationMessage::StartPairing { uuid }),
    )
}

/// Handler for DELETE /v1/devices/:uuid
#[tracing::instrument(skip(state))]
async fn remove_device(State(state): State<Arc<AppState>>, Path(uuid): Path<String>) -> Response {
    command_response(
        state
            .engine
            .send_command(ToIntegrationMessage::RemoveDevice { uuid }),
    )
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/devices", get(devices))
        .route("/v1/devices/:uuid/hvac_mode", post(set_hvac_mode))
        .route("/v1/devices/:uuid/fan_mode", post(set_fan_mode))
        .route("/v1/devices/:uuid/temperature", post(set_temperature))
        .route("/v1/devices/:uuid/pair", post(pair))
        .route("/v1/devices/:uuid", delete(remove_device))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to the specified address and serves the API endpoints until the
/// provided shutdown signal is triggered.
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

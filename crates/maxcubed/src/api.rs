use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use maxcube::CommandError;
use maxcube::Mode;
use maxcube::RfAddress;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;
use crate::coordinator::CoordinatorError;
use crate::coordinator::CubeState;
use crate::coordinator::GpioStatus;
use crate::entities;
use crate::entities::Entity;
use crate::entities::HvacMode;
use crate::gpio::GpioClient;
use crate::gpio::GpioOutcome;

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

#[derive(Serialize)]
struct CubeSummary {
    name: String,
    address: String,
    available: bool,
    devices: usize,
    rooms: usize,
}

#[derive(Serialize)]
struct CubeResponse {
    name: String,
    #[serde(flatten)]
    state: CubeState,
    gpio: GpioStatus,
}

#[derive(Deserialize)]
struct TemperatureRequest {
    temperature: f64,
}

#[derive(Deserialize)]
struct ModeRequest {
    mode: Mode,
}

#[derive(Deserialize)]
struct HvacModeRequest {
    hvac_mode: HvacMode,
}

#[derive(Deserialize)]
struct GpioRequest {
    command: String,
    #[serde(default)]
    url: Option<String>,
}

/// Shared application state
pub struct AppState {
    version: &'static str,
    cubes: BTreeMap<String, Arc<Coordinator>>,
    gpio: GpioClient,
}

impl AppState {
    pub fn new(cubes: BTreeMap<String, Arc<Coordinator>>, gpio: GpioClient) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            cubes,
            gpio,
        }
    }

    fn cube(&self, name: &str) -> Result<&Arc<Coordinator>, ApiError> {
        self.cubes
            .get(name)
            .ok_or_else(|| ApiError::NotFound(format!("cube {} not found", name)))
    }
}

/// Error body for every failing endpoint
#[derive(Debug)]
enum ApiError {
    NotFound(String),
    BadRequest(String),
    BadGateway(String),
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let message = err.to_string();
        match err {
            CoordinatorError::DeviceNotFound(_) => ApiError::NotFound(message),
            CoordinatorError::ModeChangesDisabled => ApiError::BadRequest(message),
            CoordinatorError::Command(
                CommandError::InvalidArgument(_) | CommandError::InvalidState(_),
            ) => ApiError::BadRequest(message),
            CoordinatorError::Command(_) | CoordinatorError::Update(_) => {
                ApiError::BadGateway(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
        };
        tracing::debug!("Request failed with {}: {}", status, message);
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn parse_rf(rf: &str) -> Result<RfAddress, ApiError> {
    rf.parse()
        .map_err(|e: maxcube::DecodeError| ApiError::BadRequest(e.to_string()))
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

#[tracing::instrument(skip(state))]
async fn list_cubes(State(state): State<Arc<AppState>>) -> Json<Vec<CubeSummary>> {
    let cubes = state
        .cubes
        .iter()
        .map(|(name, coordinator)| {
            let current = coordinator.state();
            CubeSummary {
                name: name.clone(),
                address: coordinator.options().address.clone(),
                available: current.last_update_success,
                devices: current.snapshot.devices.len(),
                rooms: current.snapshot.rooms.len(),
            }
        })
        .collect();
    Json(cubes)
}

#[tracing::instrument(skip(state))]
async fn get_cube(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<CubeResponse>, ApiError> {
    let coordinator = state.cube(&name)?;
    Ok(Json(CubeResponse {
        name,
        state: CubeState::clone(&coordinator.state()),
        gpio: coordinator.gpio_status(),
    }))
}

#[tracing::instrument(skip(state))]
async fn get_entities(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let coordinator = state.cube(&name)?;
    Ok(Json(entities::entities(
        &coordinator.state(),
        coordinator.options(),
    )))
}

#[tracing::instrument(skip(state, body))]
async fn set_temperature(
    State(state): State<Arc<AppState>>,
    Path((name, rf)): Path<(String, String)>,
    Json(body): Json<TemperatureRequest>,
) -> Result<StatusCode, ApiError> {
    let coordinator = state.cube(&name)?;
    let rf = parse_rf(&rf)?;
    coordinator
        .set_target_temperature(rf, body.temperature)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state, body))]
async fn set_mode(
    State(state): State<Arc<AppState>>,
    Path((name, rf)): Path<(String, String)>,
    Json(body): Json<ModeRequest>,
) -> Result<StatusCode, ApiError> {
    let coordinator = state.cube(&name)?;
    let rf = parse_rf(&rf)?;
    coordinator.set_mode(rf, body.mode).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state, body))]
async fn set_hvac_mode(
    State(state): State<Arc<AppState>>,
    Path((name, rf)): Path<(String, String)>,
    Json(body): Json<HvacModeRequest>,
) -> Result<StatusCode, ApiError> {
    let coordinator = state.cube(&name)?;
    let rf = parse_rf(&rf)?;
    coordinator.set_hvac_mode(rf, body.hvac_mode).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state))]
async fn reload(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.cube(&name)?.reload_devices().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state))]
async fn clear_and_reload(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.cube(&name)?.clear_and_reload_devices().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state, body))]
async fn gpio_command(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GpioRequest>,
) -> Json<GpioOutcome> {
    let coordinators: Vec<_> = state.cubes.values().cloned().collect();
    Json(
        state
            .gpio
            .dispatch(&body.command, body.url.as_deref(), &coordinators)
            .await,
    )
}

/// Create the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/cubes", get(list_cubes))
        .route("/v1/cubes/:name", get(get_cube))
        .route("/v1/cubes/:name/entities", get(get_entities))
        .route(
            "/v1/cubes/:name/devices/:rf/temperature",
            post(set_temperature),
        )
        .route("/v1/cubes/:name/devices/:rf/mode", post(set_mode))
        .route("/v1/cubes/:name/devices/:rf/hvac_mode", post(set_hvac_mode))
        .route("/v1/cubes/:name/reload", post(reload))
        .route("/v1/cubes/:name/clear_and_reload", post(clear_and_reload))
        .route("/v1/gpio", post(gpio_command))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    listen: String,
    port: u16,
    state: Arc<AppState>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
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

/// Route handlers for the HTTP API

use super::types::*;
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use camgate_core::{
    validate_command, CommandFacade, CommandKind, CommandOutcome, DiscoveryEngine,
    FocusSpeedPolicy,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub facade: CommandFacade,
    pub discovery: DiscoveryEngine,
    pub focus_speed: FocusSpeedPolicy,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/camera/data", post(camera_data))
        .route("/api/camera/set-profile", post(set_profile))
        .route("/api/ptz/move", post(ptz_move))
        .route("/api/ptz/stop", post(ptz_stop))
        .route("/api/focus/move", post(focus_move))
        .route("/api/focus/stop", post(focus_stop))
        .route("/api/discovery/onvif-devices", get(discover_devices))
        .route("/api/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Validate the body for `kind` and dispatch it. Nothing reaches the device
/// unless every field of every table for the endpoint is valid.
async fn run_command(
    state: &AppState,
    kind: CommandKind,
    body: &[u8],
) -> Result<CommandOutcome, ApiError> {
    let raw = parse_body(body)?;
    let command = validate_command(kind, &raw, state.focus_speed).map_err(|report| {
        debug!(
            command = kind.as_str(),
            fields = ?report.fields().collect::<Vec<_>>(),
            "Request rejected"
        );
        ApiError::from(report)
    })?;

    let outcome = state
        .facade
        .dispatch(&command.credentials, &command.request)
        .await?;
    Ok(outcome)
}

fn respond(result: Result<CommandOutcome, ApiError>) -> Response {
    match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/camera/data - Device identity, profiles and health
async fn camera_data(State(state): State<AppState>, body: Bytes) -> Response {
    info!("POST /api/camera/data");
    respond(run_command(&state, CommandKind::FetchCameraData, &body).await)
}

/// POST /api/camera/set-profile - Resolve the stream of a profile
async fn set_profile(State(state): State<AppState>, body: Bytes) -> Response {
    info!("POST /api/camera/set-profile");
    respond(run_command(&state, CommandKind::SelectProfile, &body).await)
}

/// POST /api/ptz/move - Start continuous pan/tilt/zoom
async fn ptz_move(State(state): State<AppState>, body: Bytes) -> Response {
    info!("POST /api/ptz/move");
    respond(run_command(&state, CommandKind::MovePtz, &body).await)
}

/// POST /api/ptz/stop
async fn ptz_stop(State(state): State<AppState>, body: Bytes) -> Response {
    info!("POST /api/ptz/stop");
    respond(run_command(&state, CommandKind::StopPtz, &body).await)
}

/// POST /api/focus/move - Start continuous focus on the first video source
async fn focus_move(State(state): State<AppState>, body: Bytes) -> Response {
    info!("POST /api/focus/move");
    respond(run_command(&state, CommandKind::MoveFocus, &body).await)
}

/// POST /api/focus/stop
async fn focus_stop(State(state): State<AppState>, body: Bytes) -> Response {
    info!("POST /api/focus/stop");
    respond(run_command(&state, CommandKind::StopFocus, &body).await)
}

/// GET /api/discovery/onvif-devices - Multicast probe for cameras
async fn discover_devices(State(state): State<AppState>) -> Response {
    info!("GET /api/discovery/onvif-devices");

    match state.discovery.discover().await {
        Ok(devices) => Json(DevicesResponse { devices }).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET /api/health - Health check endpoint
async fn health_check() -> Response {
    Json(HealthResponse::healthy()).into_response()
}

//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::BridgeError;
use crate::models::DeviceId;
use crate::server::state::ServerState;
use crate::surface::controls::{
    Control, ProgramSwitchControl, ValveActive, ValveName, ValveRemainingDuration,
    ValveSetDuration,
};
use crate::utils::version_info;

/// Error body returned by every failing handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps bridge errors onto HTTP statuses
pub struct ApiError(BridgeError);

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::ValidationError(_) => StatusCode::BAD_REQUEST,
            BridgeError::ReadOnly(_) => StatusCode::METHOD_NOT_ALLOWED,
            BridgeError::EngineError(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "irrigation-bridge".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// All started devices
pub async fn devices_handler(
    State(state): State<Arc<ServerState>>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.devices().await?))
}

pub async fn device_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: DeviceId = id.parse()?;
    Ok(Json(state.engine.device(id).await?))
}

/// Ask a controller for a full status broadcast
pub async fn refresh_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: DeviceId = id.parse()?;
    state.engine.refresh(id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn valve_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, relay)): Path<(String, u8)>,
) -> ApiResult<impl IntoResponse> {
    let id: DeviceId = id.parse()?;
    Ok(Json(state.engine.valve(id, relay).await?))
}

/// Valve write request; absent fields are left alone
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValveUpdate {
    pub active: Option<bool>,
    pub set_duration: Option<u32>,
    pub configured_name: Option<String>,
}

pub async fn put_valve_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, relay)): Path<(String, u8)>,
    Json(update): Json<ValveUpdate>,
) -> ApiResult<impl IntoResponse> {
    let id: DeviceId = id.parse()?;
    let engine = &state.engine;

    if let Some(name) = update.configured_name {
        ValveName::new(engine.clone(), id, relay).set(name).await?;
    }
    if let Some(seconds) = update.set_duration {
        ValveSetDuration::new(engine.clone(), id, relay)
            .set(seconds)
            .await?;
    }
    if let Some(active) = update.active {
        ValveActive::new(engine.clone(), id, relay)
            .set(active)
            .await?;
    }
    Ok(Json(engine.valve(id, relay).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingResponse {
    pub relay: u8,
    pub remaining_duration: u32,
}

pub async fn remaining_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, relay)): Path<(String, u8)>,
) -> ApiResult<impl IntoResponse> {
    let id: DeviceId = id.parse()?;
    let remaining_duration = ValveRemainingDuration::new(state.engine.clone(), id, relay)
        .get()
        .await?;
    Ok(Json(RemainingResponse {
        relay,
        remaining_duration,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgramBody {
    pub on: bool,
}

pub async fn get_program_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, subtype)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id: DeviceId = id.parse()?;
    let on = ProgramSwitchControl::new(state.engine.clone(), id, subtype)
        .get()
        .await?;
    Ok(Json(ProgramBody { on }))
}

pub async fn put_program_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, subtype)): Path<(String, String)>,
    Json(body): Json<ProgramBody>,
) -> ApiResult<impl IntoResponse> {
    let id: DeviceId = id.parse()?;
    let control = ProgramSwitchControl::new(state.engine.clone(), id, subtype);
    control.set(body.on).await?;
    Ok(Json(ProgramBody {
        on: control.get().await?,
    }))
}

/// What the control surface currently shows
pub async fn surface_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.surface.devices())
}

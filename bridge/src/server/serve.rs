//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::BridgeError;
use crate::server::handlers::{
    device_handler, devices_handler, get_program_handler, health_handler, put_program_handler,
    put_valve_handler, refresh_handler, remaining_handler, surface_handler, valve_handler,
    version_handler,
};
use crate::server::state::ServerState;
use crate::storage::settings::ServerSettings;

/// Build the API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Devices
        .route("/devices", get(devices_handler))
        .route("/devices/{id}", get(device_handler))
        .route("/devices/{id}/refresh", post(refresh_handler))
        // Valves
        .route(
            "/devices/{id}/valves/{relay}",
            get(valve_handler).put(put_valve_handler),
        )
        .route("/devices/{id}/valves/{relay}/remaining", get(remaining_handler))
        // Programs
        .route(
            "/devices/{id}/programs/{subtype}",
            get(get_program_handler).put(put_program_handler),
        )
        // Surface view
        .route("/surface", get(surface_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerSettings,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), BridgeError>>, BridgeError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| BridgeError::ServerError(e.to_string()))
    });

    Ok(handle)
}

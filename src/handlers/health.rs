use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use tracing::{debug, error};

use crate::models::{ErrorResponse, HealthResponse, ReadyResponse};
use crate::state::AppState;

/// Health check endpoint
///
/// Counts come from the hub on every call, so they are never stale.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<HealthResponse>), (StatusCode, Json<ErrorResponse>)> {
    debug!("Health check requested");
    let stats = match state.hub.stats().await {
        Some(stats) => stats,
        None => {
            error!("Relay hub is not responding");
            return Err(ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, "Relay hub is not running"));
        }
    };

    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            rooms: stats.rooms,
            connections: stats.connections,
        }),
    ))
}

/// Readiness check endpoint
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ReadyResponse>), (StatusCode, Json<ErrorResponse>)> {
    debug!("Readiness check requested");
    if state.hub.stats().await.is_none() {
        return Err(ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, "Relay hub is not running"));
    }
    Ok((
        StatusCode::OK,
        Json(ReadyResponse {
            status: "ok".to_string(),
            message: "Relay hub is accepting connections".to_string(),
            service: state.config.service_name.clone(),
        }),
    ))
}

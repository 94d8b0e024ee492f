use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Relay is healthy", body = HealthResponse),
        (status = 503, description = "Relay hub is not running", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Relay is ready", body = ReadyResponse),
        (status = 503, description = "Relay hub is not running", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Relay and process statistics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current statistics", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Membership of a room
#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room membership", body = RoomInfoResponse)
    )
)]
#[allow(dead_code)]
pub async fn room_info_doc() {}

/// Latest merged state of a live room
#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}/state",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Merged document state", body = RoomStateResponse),
        (status = 404, description = "Room is not active", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn room_state_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        room_info_doc,
        room_state_doc,
    ),
    components(
        schemas(HealthResponse, ReadyResponse, DiagnosticsResponse, RoomInfoResponse, RoomStateResponse, ErrorResponse)
    ),
    tags(
        (name = "relay", description = "Collaboration relay endpoints")
    )
)]
pub struct ApiDoc;

use axum::{extract::{Path, State}, http::StatusCode, Json};
use tracing::{debug, error};

use crate::models::{ErrorResponse, RoomInfoResponse, RoomStateResponse};
use crate::state::AppState;

/// Membership of a room. Unknown rooms are reported with `exists: false`.
pub async fn room_info(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<RoomInfoResponse>), (StatusCode, Json<ErrorResponse>)> {
    let info = match state.hub.room_info(&room_id).await {
        Some(info) => info,
        None => {
            error!("Relay hub is not responding");
            return Err(ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, "Relay hub is not running"));
        }
    };

    Ok((
        StatusCode::OK,
        Json(RoomInfoResponse {
            room: room_id,
            exists: info.exists,
            connections: info.connections,
            awareness_clients: info.awareness_clients,
            created_at: info.created_at,
        }),
    ))
}

/// Latest merged state of a live room, for the persistence job
pub async fn room_state(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<RoomStateResponse>), (StatusCode, Json<ErrorResponse>)> {
    match state.hub.snapshot(&room_id).await {
        Some(Some(snapshot)) => {
            debug!("Serving state of room {} ({} bytes)", room_id, snapshot.update.len());
            Ok((
                StatusCode::OK,
                Json(RoomStateResponse {
                    room: room_id,
                    update: snapshot.update,
                    state_vector: snapshot.state_vector,
                }),
            ))
        }
        Some(None) => Err(ErrorResponse::reply(
            StatusCode::NOT_FOUND,
            format!("Room '{}' is not active", room_id),
        )),
        None => {
            error!("Relay hub is not responding");
            Err(ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, "Relay hub is not running"))
        }
    }
}

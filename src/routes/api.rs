use crate::{handlers::{diagnostics, room_info, room_state}, state::AppState};
use axum::{routing::get, Router};

/// Create API routes
pub fn create_api_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/rooms/:room_id", get(room_info))
        .route("/v1/rooms/:room_id/state", get(room_state))
}

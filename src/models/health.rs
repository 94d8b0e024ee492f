use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API response for health check
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 time the check ran
    pub timestamp: String,
    /// Live rooms
    pub rooms: usize,
    /// Open WebSocket connections across all rooms
    pub connections: usize,
}

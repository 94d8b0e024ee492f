use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Relay occupancy and host load
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub service: String,
    pub environment: String,
    /// Open relay connections
    pub n_conn: u32,
    /// Live rooms
    pub n_rooms: u32,
    /// Awareness client ids currently announced across all rooms
    pub n_awareness_clients: u32,
    pub cpu_usage: f32,
    /// Bytes in use on the host
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}

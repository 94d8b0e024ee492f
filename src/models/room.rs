use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use utoipa::ToSchema;

/// Membership of a single room
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoResponse {
    pub room: String,
    pub exists: bool,
    pub connections: usize,
    pub awareness_clients: usize,
    pub created_at: Option<DateTime<Utc>>,
}

/// Latest merged document state of a live room
#[serde_as]
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateResponse {
    pub room: String,
    /// Full state encoded as a Yjs v1 update
    #[serde_as(as = "Base64")]
    #[schema(value_type = String, format = Byte)]
    pub update: Vec<u8>,
    /// Yjs v1 state vector of `update`
    #[serde_as(as = "Base64")]
    #[schema(value_type = String, format = Byte)]
    pub state_vector: Vec<u8>,
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Readiness of the relay: the HTTP server is up and the hub answers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReadyResponse {
    pub status: String,
    pub message: String,
    pub service: String,
}

use chrono::{DateTime, Utc};

use crate::sync::awareness::AwarenessTracker;
use crate::sync::crdt::SharedDocument;

/// Shared state of one collaboration session. Membership is tracked by the
/// connection registry; a room only exists while it has members.
pub struct Room<D> {
    pub id: String,
    pub doc: D,
    pub awareness: AwarenessTracker,
    pub created_at: DateTime<Utc>,
}

impl<D: SharedDocument> Room<D> {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            doc: D::default(),
            awareness: AwarenessTracker::default(),
            created_at: Utc::now(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SessionId;

/// One of the fixed event names published on the in-process bus (§6).
/// Kept as a plain string rather than an enum so every crate can publish
/// its own named events without a central registry crate depending on
/// all of them — the reference engine's `EngineEvent` takes the same
/// shape (`event_type: &str`, `properties: Value`).
pub type EventPayload = Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreEvent {
    pub event_type: String,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub properties: EventPayload,
}

impl CoreEvent {
    pub fn new(event_type: impl Into<String>, session_id: SessionId, properties: Value) -> Self {
        Self {
            event_type: event_type.into(),
            session_id,
            timestamp: Utc::now(),
            properties,
        }
    }
}

//! Wire shapes for the real-time channel.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A typed payload pushed to connected clients. Constructed by business
/// logic callers and handed to the registry; never persisted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OutboundEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl OutboundEvent {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        OutboundEvent {
            kind: kind.into(),
            data,
        }
    }

    pub fn pong() -> Self {
        OutboundEvent::new("pong", json!({}))
    }

    pub fn message_created(meeting_id: &str, message: Value) -> Self {
        OutboundEvent::new(
            "message_created",
            json!({ "meeting_id": meeting_id, "message": message }),
        )
    }

    pub fn transcription_complete(meeting_id: &str, status: &str) -> Self {
        OutboundEvent::new(
            "transcription_complete",
            json!({ "meeting_id": meeting_id, "status": status }),
        )
    }
}

/// Frames clients may send over an admitted connection. Unknown types
/// deserialize to `Unknown` so newer clients don't break older servers.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Liveness probe, answered with a `pong` event on the same connection.
    Ping,
    Ack {
        #[serde(default)]
        event_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

//! Push surface for business-logic callers: persisted messages, finished
//! transcription jobs, operator announcements. A delivered count of 0 means
//! the user is offline, which is a success, not an error.

use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::events::OutboundEvent;
use crate::queue::socket::ActiveSockets;
use crate::routes::ApiError;
use crate::util::extract::{Extension, Json, Path};

pub fn config() -> Router {
    Router::new()
        .route("/notify/:user_id", post(notify_user))
        .route("/broadcast", post(broadcast))
        .route("/messages", post(message_persisted))
        .route("/jobs/transcription", post(transcription_complete))
}

#[derive(Deserialize)]
pub struct NotifyBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

pub async fn notify_user(
    Path(user_id): Path<String>,
    Extension(sockets): Extension<Arc<ActiveSockets>>,
    Json(body): Json<NotifyBody>,
) -> Result<Json<Value>, ApiError> {
    if body.kind.is_empty() {
        return Err(ApiError::InvalidInput(
            "event type must not be empty".to_string(),
        ));
    }

    let event = OutboundEvent::new(body.kind, body.data);
    let delivered = sockets.send_to_user(&user_id, &event);
    Ok(Json(json!({ "delivered": delivered })))
}

#[derive(Deserialize)]
pub struct BroadcastBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub exclude_user_ids: Vec<String>,
}

pub async fn broadcast(
    Extension(sockets): Extension<Arc<ActiveSockets>>,
    Json(body): Json<BroadcastBody>,
) -> Result<Json<Value>, ApiError> {
    if body.kind.is_empty() {
        return Err(ApiError::InvalidInput(
            "event type must not be empty".to_string(),
        ));
    }

    let exclude: Vec<&str> = body.exclude_user_ids.iter().map(|x| x.as_str()).collect();
    let event = OutboundEvent::new(body.kind, body.data);
    let delivered = sockets.broadcast(&event, &exclude);
    Ok(Json(json!({ "delivered": delivered })))
}

#[derive(Deserialize)]
pub struct MessagePersistedBody {
    pub user_id: String,
    pub meeting_id: String,
    pub message: Value,
}

/// Callback fired once the storage layer has persisted a meeting message.
pub async fn message_persisted(
    Extension(sockets): Extension<Arc<ActiveSockets>>,
    Json(body): Json<MessagePersistedBody>,
) -> Result<Json<Value>, ApiError> {
    let event = OutboundEvent::message_created(&body.meeting_id, body.message);
    let delivered = sockets.send_to_user(&body.user_id, &event);
    Ok(Json(json!({ "delivered": delivered })))
}

#[derive(Deserialize)]
pub struct TranscriptionJobBody {
    pub user_id: String,
    pub meeting_id: String,
    pub status: String,
}

/// Completion callback from the speech-to-text worker.
pub async fn transcription_complete(
    Extension(sockets): Extension<Arc<ActiveSockets>>,
    Json(body): Json<TranscriptionJobBody>,
) -> Result<Json<Value>, ApiError> {
    let event = OutboundEvent::transcription_complete(&body.meeting_id, &body.status);
    let delivered = sockets.send_to_user(&body.user_id, &event);

    tracing::info!(
        user_id = %body.user_id,
        meeting_id = %body.meeting_id,
        status = %body.status,
        delivered,
        "transcription job completion fanned out"
    );
    Ok(Json(json!({ "delivered": delivered })))
}

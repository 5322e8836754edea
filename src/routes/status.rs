use std::sync::Arc;

use crate::queue::socket::ActiveSockets;
use crate::routes::ApiError;
use crate::util::extract::{Extension, Json};
use axum::http::StatusCode;
use serde_json::{json, Value};

pub async fn health_get(
    Extension(sockets): Extension<Arc<ActiveSockets>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "connections": sockets.connection_count(),
        })),
    ))
}

pub async fn statistics_get(
    Extension(sockets): Extension<Arc<ActiveSockets>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    Ok((
        StatusCode::OK,
        Json(json!({
            "connections": sockets.connection_count(),
            "connected_users": sockets.connected_user_count(),
            "malformed_frames": sockets.malformed_frame_count(),
        })),
    ))
}

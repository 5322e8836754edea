pub mod notify;

pub use super::ApiError;
use crate::util::cors::default_cors;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Router;

pub fn config() -> Router {
    Router::new().nest(
        "/_internal",
        Router::new()
            .merge(notify::config())
            .layer(axum::middleware::from_fn(admin_key_guard))
            .layer(default_cors()),
    )
}

// These routes are called by trusted backend workers only, never by clients.
pub async fn admin_key_guard(request: Request, next: Next) -> Response {
    let admin_key = dotenvy::var("ADMIN_KEY").ok();
    let provided = request
        .headers()
        .get("x-admin-key")
        .and_then(|x| x.to_str().ok());

    match (admin_key.as_deref(), provided) {
        (Some(expected), Some(provided)) if expected == provided => next.run(request).await,
        _ => ApiError::Unauthorized.into_response(),
    }
}

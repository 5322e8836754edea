use axum::extract::rejection::{
    ExtensionRejection, JsonRejection, PathRejection, QueryRejection,
};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

pub mod index;
pub mod internal;
pub mod status;
pub mod ws;

mod not_found;

pub use self::not_found::not_found;

pub fn root_config() -> Router {
    Router::new()
        .route("/", get(index::index_get))
        .route("/health", get(status::health_get))
        .route("/statistics", get(status::statistics_get))
        .route("/ws", get(ws::ws_init))
        .merge(internal::config())
        .fallback(not_found)
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Environment error")]
    Env(#[from] dotenvy::Error),
    #[error("Deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Authentication error: {0}")]
    Authentication(#[from] crate::auth::AuthenticationError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Error while validating input: {0}")]
    Validation(String),
    #[error("You are not authorized to perform this action")]
    Unauthorized,
}

impl ApiError {
    pub fn as_api_error(&self) -> crate::models::error::ApiError {
        crate::models::error::ApiError {
            error: match self {
                ApiError::Env(..) => "environment_error",
                ApiError::Json(..) => "json_error",
                ApiError::Authentication(..) => "unauthorized",
                ApiError::InvalidInput(..) => "invalid_input",
                ApiError::Validation(..) => "invalid_input",
                ApiError::Unauthorized => "unauthorized",
            },
            description: self.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Env(..) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Json(..) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(..) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidInput(..) => StatusCode::BAD_REQUEST,
            ApiError::Validation(..) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.as_api_error())).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<ExtensionRejection> for ApiError {
    fn from(err: ExtensionRejection) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<WebSocketUpgradeRejection> for ApiError {
    fn from(err: WebSocketUpgradeRejection) -> Self {
        ApiError::Validation(err.to_string())
    }
}

//! API route handlers

pub mod health;
pub mod size;
pub mod skin_tone;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use stylesync_ai::StyleSyncError;

/// Handler error mapped onto an HTTP status
#[derive(Debug)]
pub enum ApiError {
    /// The model behind the endpoint did not load at startup
    Unavailable(&'static str),
    BadRequest(String),
    MissingFeature(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingFeature(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Unavailable(model) => format!("{model} model is not loaded"),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
            ApiError::MissingFeature(key) => format!("missing required feature: {key}"),
        }
    }
}

impl From<StyleSyncError> for ApiError {
    fn from(err: StyleSyncError) -> Self {
        match err {
            StyleSyncError::MissingFeature(key) => ApiError::MissingFeature(key),
            StyleSyncError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("inference task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            error!("{} {}", status, detail);
        } else {
            warn!("{} {}", status, detail);
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

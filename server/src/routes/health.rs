//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub skin_tone: &'static str,
    pub size_prediction: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub models: ModelStatus,
}

fn availability(loaded: bool) -> &'static str {
    if loaded {
        "loaded"
    } else {
        "unavailable"
    }
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "StylesSync AI API is running".to_string(),
        version: stylesync_ai::VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
        models: ModelStatus {
            skin_tone: availability(state.skin_tone_loaded()),
            size_prediction: availability(state.size_loaded()),
        },
    })
}

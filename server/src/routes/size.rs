//! Size prediction endpoint

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;

use super::ApiError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct SizeResponse {
    pub predicted_size: String,
    pub probabilities: BTreeMap<String, f64>,
    pub confidence: f64,
    pub message: String,
}

/// POST /predict_size - predict S/M/L from seven body and garment fields
pub async fn predict_size(
    State(state): State<SharedState>,
    Json(features): Json<Value>,
) -> Result<Json<SizeResponse>, ApiError> {
    if !state.size_loaded() {
        return Err(ApiError::Unavailable("size prediction"));
    }

    let prediction = tokio::task::spawn_blocking(move || {
        state
            .size_model()
            .ok_or(ApiError::Unavailable("size prediction"))
            .and_then(|model| model.predict_value(&features).map_err(ApiError::from))
    })
    .await??;

    Ok(Json(SizeResponse {
        message: format!(
            "Successfully predicted size: {} (confidence: {:.2}%)",
            prediction.label,
            prediction.confidence * 100.0
        ),
        predicted_size: prediction.label,
        probabilities: prediction.probabilities,
        confidence: prediction.confidence,
    }))
}

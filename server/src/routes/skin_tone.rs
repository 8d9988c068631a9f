//! Skin-tone prediction endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::debug;

use super::ApiError;
use crate::state::SharedState;

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct SkinToneResponse {
    pub predicted_class: usize,
    pub class_name: String,
    pub confidence: f32,
    pub message: String,
}

/// POST /predict_skin_tone - classify an uploaded image
pub async fn predict_skin_tone(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<SkinToneResponse>, ApiError> {
    if !state.skin_tone_loaded() {
        return Err(ApiError::Unavailable("skin-tone"));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
        return classify(state, bytes.to_vec()).await.map(Json);
    }

    Err(ApiError::BadRequest(format!("missing multipart field '{UPLOAD_FIELD}'")))
}

/// Run the predictor on raw image bytes off the async runtime
pub async fn classify(state: SharedState, bytes: Vec<u8>) -> Result<SkinToneResponse, ApiError> {
    let predictor = state
        .skin_tone_predictor()
        .ok_or(ApiError::Unavailable("skin-tone"))?;

    let result = tokio::task::spawn_blocking(move || predictor.predict_bytes(&bytes)).await??;
    debug!(
        "Skin tone {} ({:.3}) in {:.2} ms",
        result.class_name, result.confidence, result.inference_time_ms
    );

    Ok(SkinToneResponse {
        predicted_class: result.predicted_class,
        message: format!(
            "Successfully predicted skin tone: {} (confidence: {:.2}%)",
            result.class_name,
            result.confidence * 100.0
        ),
        class_name: result.class_name,
        confidence: result.confidence,
    })
}

//! Inference module for skin-tone prediction
//!
//! This module provides:
//! - Loading a predictor from the best checkpoint (no optimizer state)
//! - Prediction from a file path or raw image bytes

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{PredictionResult, SkinTonePredictor};

//! Model module for the skin-tone CNN
//!
//! This module provides:
//! - The `SkinToneClassifier` architecture (three conv stages, two-layer head)
//! - Training hyper-parameters (`TrainingConfig`)

pub mod cnn;
pub mod config;

// Re-export main types for convenience
pub use cnn::{SkinToneClassifier, SkinToneClassifierConfig};
pub use config::{TrainingConfig, BEST_CHECKPOINT_FILE};

//! Garment size prediction (S / M / L)
//!
//! This module provides:
//! - Lenient preprocessing of JSON-lines size records
//! - A versioned feature schema with a single `align` encoder
//! - Multinomial logistic regression fit by Newton-Raphson
//! - Untrained/trained model types with JSON persistence

pub mod logit;
pub mod model;
pub mod preprocess;
pub mod schema;

// Re-export main types for convenience
pub use logit::{FitReport, LogitConfig, MultinomialLogit};
pub use model::{
    SizeEvaluation, SizeFeatures, SizeModelConfig, SizePrediction, TrainedSizeModel,
    UntrainedSizeModel,
};
pub use preprocess::{FeatureRow, LabeledRow, SizeCategory, SizeDataset, REQUIRED_FEATURES};
pub use schema::{align, FeatureSchema};

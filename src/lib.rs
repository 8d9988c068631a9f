//! # StylesSync AI
//!
//! Skin-tone classification and garment size prediction, built on the Burn
//! framework.
//!
//! ## Modules
//!
//! - `dataset`: Class-directory indexing, stratified split, augmentation and Burn batching
//! - `model`: The skin-tone CNN and training hyper-parameters
//! - `training`: Balanced sampling, focal loss, plateau scheduling, checkpointing and the epoch loop
//! - `inference`: Checkpoint-backed skin-tone prediction
//! - `sizing`: Tabular S/M/L size model (multinomial logistic regression)
//! - `utils`: Logging, F1 metrics, config files and errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stylesync_ai::backend::{default_device, TrainingBackend};
//! use stylesync_ai::model::TrainingConfig;
//! use stylesync_ai::training::run_training;
//!
//! let config = TrainingConfig::default();
//! let outcome = run_training::<TrainingBackend>(&config, default_device())?;
//! println!("best weighted F1: {:.4}", outcome.best_weighted_f1);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod sizing;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::loader::{DatasetStats, ImbalanceSeverity, SkinToneDataset};
pub use dataset::split::{SplitConfig, TrainValSplit};
pub use inference::predictor::{PredictionResult, SkinTonePredictor};
pub use model::cnn::{SkinToneClassifier, SkinToneClassifierConfig};
pub use model::config::TrainingConfig;
pub use sizing::{SizeFeatures, SizePrediction, TrainedSizeModel, UntrainedSizeModel};
pub use training::checkpoint::Checkpoint;
pub use training::trainer::{Trainer, TrainingOutcome};
pub use utils::error::{Result, StyleSyncError};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Default square input size for the skin-tone model
pub const IMAGE_SIZE: usize = 128;

/// Default random seed for skin-tone runs
pub const DEFAULT_SEED: u64 = 42;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

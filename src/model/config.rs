//! Training Configuration Module
//!
//! Hyper-parameters of a skin-tone training run. Defaults are the reference
//! values; a TOML file or CLI flags override individual fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::{default_class_names, AugmentationConfig};
use crate::model::cnn::SkinToneClassifierConfig;
use crate::utils::config::{load_json, load_toml_config, save_json};
use crate::utils::error::{Result, StyleSyncError};
use crate::utils::metrics::DEFAULT_LOW_METRIC_THRESHOLD;

/// File name of the best checkpoint inside the output directory
pub const BEST_CHECKPOINT_FILE: &str = "best_skin_tone_model.json";

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Directory with one subdirectory per class
    pub data_dir: PathBuf,

    /// Directory for the best checkpoint
    pub output_dir: PathBuf,

    /// Class names in label order
    pub class_names: Vec<String>,

    /// Square input size in pixels
    pub image_size: usize,

    /// Batch size for training and evaluation
    pub batch_size: usize,

    /// Initial learning rate
    pub learning_rate: f64,

    /// AdamW weight decay
    pub weight_decay: f64,

    /// Upper bound on epochs
    pub max_epochs: usize,

    /// Stop after this many epochs without weighted-F1 improvement
    pub early_stopping_patience: usize,

    /// Non-improving epochs tolerated before the learning rate is reduced
    pub plateau_patience: usize,

    /// Multiplicative learning-rate reduction on plateau
    pub plateau_factor: f64,

    /// Learning-rate floor
    pub min_learning_rate: f64,

    /// Focal modulation exponent
    pub focal_gamma: f64,

    /// Label smoothing factor
    pub label_smoothing: f64,

    /// Fraction of each class held out for validation
    pub validation_fraction: f64,

    /// Seed for the split, sampler, augmentation and weight init
    pub seed: u64,

    /// Highest tolerated fraction of placeholder images per epoch
    pub max_placeholder_rate: f64,

    /// Per-class metrics below this value are flagged
    pub low_metric_threshold: f64,

    /// Train pipeline augmentation
    pub augmentation: AugmentationConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/skin_tones"),
            output_dir: PathBuf::from("models"),
            class_names: default_class_names(),
            image_size: crate::IMAGE_SIZE,
            batch_size: 32,
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            max_epochs: 30,
            early_stopping_patience: 8,
            plateau_patience: 3,
            plateau_factor: 0.7,
            min_learning_rate: 0.0,
            focal_gamma: 2.0,
            label_smoothing: 0.1,
            validation_fraction: 0.2,
            seed: crate::DEFAULT_SEED,
            max_placeholder_rate: 0.05,
            low_metric_threshold: DEFAULT_LOW_METRIC_THRESHOLD,
            augmentation: AugmentationConfig::train(),
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(StyleSyncError::Config(msg.to_string()));

        if self.class_names.len() < 2 {
            return fail("at least two classes are required");
        }
        if self.image_size == 0 || self.image_size % 8 != 0 {
            return fail("image_size must be a positive multiple of 8");
        }
        if self.batch_size == 0 {
            return fail("batch_size must be greater than 0");
        }
        if !(self.learning_rate > 0.0) {
            return fail("learning_rate must be positive");
        }
        if self.weight_decay < 0.0 {
            return fail("weight_decay must be non-negative");
        }
        if self.max_epochs == 0 {
            return fail("max_epochs must be greater than 0");
        }
        if self.early_stopping_patience == 0 {
            return fail("early_stopping_patience must be greater than 0");
        }
        if !(self.plateau_factor > 0.0 && self.plateau_factor < 1.0) {
            return fail("plateau_factor must be in range (0.0, 1.0)");
        }
        if self.min_learning_rate < 0.0 || self.min_learning_rate > self.learning_rate {
            return fail("min_learning_rate must be in range [0.0, learning_rate]");
        }
        if self.focal_gamma < 0.0 {
            return fail("focal_gamma must be non-negative");
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return fail("label_smoothing must be in range [0.0, 1.0)");
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return fail("validation_fraction must be in range (0.0, 1.0)");
        }
        if !(0.0..=1.0).contains(&self.max_placeholder_rate) {
            return fail("max_placeholder_rate must be in range [0.0, 1.0]");
        }

        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Path of the best checkpoint
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(BEST_CHECKPOINT_FILE)
    }

    /// Architecture matching this run
    pub fn model_config(&self) -> SkinToneClassifierConfig {
        SkinToneClassifierConfig::new()
            .with_num_classes(self.num_classes())
            .with_input_size(self.image_size)
    }

    /// Load configuration from a TOML file; absent fields keep their defaults
    pub fn from_toml(path: &Path) -> Result<Self> {
        let config: Self = load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_json(path)?;
        config.validate()?;
        Ok(config)
    }
}

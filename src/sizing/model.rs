//! Size prediction model
//!
//! `UntrainedSizeModel` only knows its configuration. Fitting consumes it and
//! yields a `TrainedSizeModel`, the only type that can predict. The trained
//! model carries its feature schema, so a saved model file is self-contained.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::dataset::split::{SplitConfig, TrainValSplit};
use crate::sizing::logit::{FitReport, LogitConfig, MultinomialLogit};
use crate::sizing::preprocess::{FeatureRow, LabeledRow, SizeCategory, SizeDataset};
use crate::sizing::schema::FeatureSchema;
use crate::utils::config::{load_json, load_toml_config, save_json};
use crate::utils::error::{Result, StyleSyncError};
use crate::utils::metrics::Metrics;

/// Current on-disk layout of a saved size model
pub const SIZE_MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeModelConfig {
    /// JSON-lines training data
    pub data_path: PathBuf,
    /// Fraction of each size held out for evaluation
    pub test_fraction: f64,
    pub seed: u64,
    pub solver: LogitConfig,
}

impl Default for SizeModelConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/modcloth_final_data.json"),
            test_fraction: 0.2,
            seed: 123,
            solver: LogitConfig::default(),
        }
    }
}

impl SizeModelConfig {
    pub fn from_toml(path: &Path) -> Result<Self> {
        let config: Self = load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        SplitConfig::new(self.test_fraction, self.seed)?;
        if self.solver.max_iterations == 0 {
            return Err(StyleSyncError::Config(
                "solver.max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.solver.ridge >= 0.0 && self.solver.tolerance > 0.0) {
            return Err(StyleSyncError::Config(
                "solver.ridge must be >= 0 and solver.tolerance > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Typed prediction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeFeatures {
    pub waist: f64,
    /// 1-5 rating
    pub quality: f64,
    pub category: String,
    pub bust: f64,
    pub height: f64,
    pub length: f64,
    pub fit: String,
}

impl From<&SizeFeatures> for FeatureRow {
    fn from(features: &SizeFeatures) -> Self {
        FeatureRow {
            measurements: [
                Some(features.waist),
                Some(features.quality),
                Some(features.bust),
                Some(features.height),
                Some(features.length),
            ]
            .map(|v| v.filter(|x| x.is_finite())),
            text_lengths: [0.0, 0.0],
            categories: [Some(features.category.clone()), Some(features.fit.clone())],
        }
    }
}

/// Predicted size with the full distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizePrediction {
    pub label: String,
    pub probabilities: BTreeMap<String, f64>,
    pub confidence: f64,
}

impl SizePrediction {
    fn from_probabilities(probabilities: &[f64]) -> Self {
        let (best, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .unwrap_or((0, 0.0));
        let label = SizeCategory::from_index(best).unwrap_or(SizeCategory::S).to_string();

        Self {
            label,
            probabilities: SizeCategory::ALL
                .iter()
                .zip(probabilities)
                .map(|(c, &p)| (c.to_string(), p))
                .collect(),
            confidence,
        }
    }
}

/// Held-out evaluation of a fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeEvaluation {
    pub train_samples: usize,
    pub test_samples: usize,
    pub accuracy: f64,
    pub metrics: Metrics,
    pub fit: FitReport,
}

impl SizeEvaluation {
    pub fn report(&self) -> String {
        let mut output = format!(
            "Train rows: {}, test rows: {}\nSolver: {} iterations, converged: {}\nAccuracy: {:.4}\n",
            self.train_samples, self.test_samples, self.fit.iterations, self.fit.converged, self.accuracy
        );
        output.push_str(&self.metrics.report());
        output.push_str(&self.metrics.confusion_matrix.display(Some(SizeCategory::labels().as_slice())));
        output
    }
}

#[derive(Debug, Clone)]
pub struct UntrainedSizeModel {
    config: SizeModelConfig,
}

impl UntrainedSizeModel {
    pub fn new(config: SizeModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizeModelConfig {
        &self.config
    }

    /// Load `config.data_path` and fit
    pub fn fit_from_file(self) -> Result<(TrainedSizeModel, SizeEvaluation)> {
        let dataset = SizeDataset::load_jsonl(&self.config.data_path)?;
        self.fit(&dataset)
    }

    /// Stratified split, schema derivation on the training part, logit fit,
    /// then evaluation on the held-out part
    pub fn fit(self, dataset: &SizeDataset) -> Result<(TrainedSizeModel, SizeEvaluation)> {
        self.config.validate()?;
        if dataset.is_empty() {
            return Err(StyleSyncError::Dataset("no size rows with a usable target".to_string()));
        }

        let labels = dataset.labels();
        let split_config = SplitConfig::new(self.config.test_fraction, self.config.seed)?;
        let split = TrainValSplit::stratified(&labels, &split_config)?;

        let train: Vec<&LabeledRow> = split.train.iter().map(|&i| &dataset.rows[i]).collect();
        let test: Vec<&LabeledRow> = split.validation.iter().map(|&i| &dataset.rows[i]).collect();

        let mut counts = [0usize; 3];
        for row in &train {
            counts[row.target.index()] += 1;
        }
        if let Some(absent) = SizeCategory::ALL.iter().find(|c| counts[c.index()] == 0) {
            return Err(StyleSyncError::Dataset(format!(
                "size {absent} has no training rows"
            )));
        }

        let train_features: Vec<FeatureRow> = train.iter().map(|r| r.features.clone()).collect();
        let schema = FeatureSchema::fit(&train_features)?;
        let x: Vec<Vec<f64>> = train_features.iter().map(|r| schema.align(r)).collect();
        let y: Vec<usize> = train.iter().map(|r| r.target.index()).collect();

        info!(
            "Fitting size model on {} rows with {} encoded columns",
            x.len(),
            schema.width()
        );
        let (logit, fit) = MultinomialLogit::fit(&x, &y, SizeCategory::ALL.len(), &self.config.solver)?;

        let model = TrainedSizeModel {
            format_version: SIZE_MODEL_FORMAT_VERSION,
            schema,
            logit,
            trained_at: Utc::now().to_rfc3339(),
        };

        let test_rows: Vec<LabeledRow> = test.into_iter().cloned().collect();
        let metrics = model.evaluate(&test_rows);
        let evaluation = SizeEvaluation {
            train_samples: x.len(),
            test_samples: test_rows.len(),
            accuracy: metrics.confusion_matrix.accuracy(),
            metrics,
            fit,
        };
        info!(
            "Size model: accuracy {:.4}, weighted F1 {:.4}, macro F1 {:.4} on {} test rows",
            evaluation.accuracy,
            evaluation.metrics.weighted_f1,
            evaluation.metrics.macro_f1,
            evaluation.test_samples
        );

        Ok((model, evaluation))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedSizeModel {
    pub format_version: u32,
    pub schema: FeatureSchema,
    pub logit: MultinomialLogit,
    /// RFC 3339 fit time
    pub trained_at: String,
}

impl TrainedSizeModel {
    /// Predict from a loosely typed feature mapping
    pub fn predict(&self, features: &Map<String, Value>) -> Result<SizePrediction> {
        let row = FeatureRow::from_request(features)?;
        Ok(self.predict_row(&row))
    }

    /// Predict from a JSON value; non-objects are invalid input
    pub fn predict_value(&self, features: &Value) -> Result<SizePrediction> {
        let row = FeatureRow::from_request_value(features)?;
        Ok(self.predict_row(&row))
    }

    pub fn predict_features(&self, features: &SizeFeatures) -> SizePrediction {
        self.predict_row(&FeatureRow::from(features))
    }

    pub fn predict_row(&self, row: &FeatureRow) -> SizePrediction {
        let encoded = self.schema.align(row);
        SizePrediction::from_probabilities(&self.logit.probabilities(&encoded))
    }

    /// Per-class metrics on labeled rows
    pub fn evaluate(&self, rows: &[LabeledRow]) -> Metrics {
        let predictions: Vec<usize> = rows
            .iter()
            .map(|r| {
                let p = self.logit.probabilities(&self.schema.align(&r.features));
                argmax(&p)
            })
            .collect();
        let truth: Vec<usize> = rows.iter().map(|r| r.target.index()).collect();
        Metrics::from_predictions(&predictions, &truth, SizeCategory::ALL.len())
            .with_class_names(&SizeCategory::labels())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)?;
        info!("Size model saved to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let model: Self = load_json(path)?;
        if model.format_version != SIZE_MODEL_FORMAT_VERSION {
            return Err(StyleSyncError::Model(format!(
                "unsupported size model format {} (expected {})",
                model.format_version, SIZE_MODEL_FORMAT_VERSION
            )));
        }
        model.schema.check()?;
        if model.logit.num_features != model.schema.width()
            || model.logit.num_classes != SizeCategory::ALL.len()
            || model.logit.coefficients.len() != SizeCategory::ALL.len() - 1
            || model
                .logit
                .coefficients
                .iter()
                .any(|row| row.len() != model.schema.width() + 1)
        {
            return Err(StyleSyncError::Model(
                "size model coefficients do not match its feature schema".to_string(),
            ));
        }
        Ok(model)
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

//! Versioned feature schema
//!
//! The schema fixes the encoded column list at training time. `align` is the
//! only encoder: training rows and prediction requests go through the same
//! function, so a request always produces exactly the training columns.
//! Unknown category levels encode as the baseline (all zeros).

use serde::{Deserialize, Serialize};

use crate::sizing::preprocess::{continuous_feature_names, FeatureRow, CATEGORICAL_FEATURES};
use crate::utils::error::{Result, StyleSyncError};

pub const SCHEMA_VERSION: u32 = 1;

/// Continuous column with its training statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    /// Mean of observed training values; imputes missing values
    pub mean: f64,
    /// Population standard deviation (1.0 for a constant column)
    pub std: f64,
    /// Whether a `<name>_missing` indicator column is emitted
    pub missing_indicator: bool,
}

impl NumericColumn {
    fn standardize(&self, value: Option<f64>) -> f64 {
        (value.unwrap_or(self.mean) - self.mean) / self.std
    }
}

/// One-hot encoded column group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    /// Sorted training levels; the first is the baseline and gets no column
    pub levels: Vec<String>,
}

impl CategoricalColumn {
    fn encoded_levels(&self) -> &[String] {
        self.levels.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub numeric: Vec<NumericColumn>,
    pub categorical: Vec<CategoricalColumn>,
    /// Encoded column names, in vector order
    pub columns: Vec<String>,
}

impl FeatureSchema {
    /// Derive the schema from training rows
    pub fn fit(rows: &[FeatureRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(StyleSyncError::Dataset(
                "cannot derive a feature schema from zero rows".to_string(),
            ));
        }

        let names = continuous_feature_names();
        let numeric = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let observed: Vec<f64> = rows.iter().filter_map(|r| r.continuous()[i]).collect();
                let (mean, std) = mean_std(&observed);
                NumericColumn {
                    name: name.to_string(),
                    mean,
                    std,
                    missing_indicator: observed.len() < rows.len(),
                }
            })
            .collect();

        let categorical = CATEGORICAL_FEATURES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut levels: Vec<String> =
                    rows.iter().filter_map(|r| r.categories[i].clone()).collect();
                levels.sort();
                levels.dedup();
                CategoricalColumn {
                    name: name.to_string(),
                    levels,
                }
            })
            .collect();

        Ok(Self::from_parts(numeric, categorical))
    }

    fn from_parts(numeric: Vec<NumericColumn>, categorical: Vec<CategoricalColumn>) -> Self {
        let mut columns: Vec<String> = numeric.iter().map(|c| c.name.clone()).collect();
        columns.extend(
            numeric
                .iter()
                .filter(|c| c.missing_indicator)
                .map(|c| format!("{}_missing", c.name)),
        );
        for group in &categorical {
            columns.extend(
                group
                    .encoded_levels()
                    .iter()
                    .map(|level| format!("{}_{}", group.name, level)),
            );
        }

        Self {
            version: SCHEMA_VERSION,
            numeric,
            categorical,
            columns,
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Encode one row; see [`align`]
    pub fn align(&self, row: &FeatureRow) -> Vec<f64> {
        align(row, self)
    }

    /// Reject schemas written by another layout or edited by hand
    pub fn check(&self) -> Result<()> {
        if self.version != SCHEMA_VERSION {
            return Err(StyleSyncError::Model(format!(
                "unsupported feature schema version {} (expected {})",
                self.version, SCHEMA_VERSION
            )));
        }
        let rebuilt = Self::from_parts(self.numeric.clone(), self.categorical.clone());
        if rebuilt.columns != self.columns {
            return Err(StyleSyncError::Model(
                "feature schema columns do not match its numeric and categorical groups"
                    .to_string(),
            ));
        }
        if self.numeric.len() != continuous_feature_names().len()
            || self.categorical.len() != CATEGORICAL_FEATURES.len()
        {
            return Err(StyleSyncError::Model(
                "feature schema does not describe the size features".to_string(),
            ));
        }
        Ok(())
    }
}

/// Encode `row` into the schema's column order
///
/// Layout: standardized continuous values, then missing indicators, then one
/// dummy per non-baseline category level.
pub fn align(row: &FeatureRow, schema: &FeatureSchema) -> Vec<f64> {
    let values = row.continuous();
    let mut encoded = Vec::with_capacity(schema.width());

    for (column, value) in schema.numeric.iter().zip(values) {
        encoded.push(column.standardize(value));
    }
    for (column, value) in schema.numeric.iter().zip(values) {
        if column.missing_indicator {
            encoded.push(if value.is_none() { 1.0 } else { 0.0 });
        }
    }
    for (group, value) in schema.categorical.iter().zip(&row.categories) {
        for level in group.encoded_levels() {
            encoded.push(if value.as_deref() == Some(level.as_str()) { 1.0 } else { 0.0 });
        }
    }

    encoded
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    (mean, if std > 1e-12 { std } else { 1.0 })
}

//! Size-data preprocessing
//!
//! Turns loosely typed JSON records into `FeatureRow`s. Measurements that are
//! not numbers (or numeric strings) become missing instead of failing the row.
//! Only a missing or non-numeric `size` drops a training row.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::utils::error::{Result, StyleSyncError};

/// Numeric predictors, in column order
///
/// `quality` is a 1-5 rating and goes through the same coercion as the body
/// measurements, so a non-numeric rating is imputed rather than one-hot
/// encoded as a level.
pub const MEASUREMENT_FEATURES: [&str; 5] = ["waist", "quality", "bust", "height", "length"];

/// Free-text fields and the derived length feature for each
pub const TEXT_FEATURES: [(&str, &str); 2] = [
    ("review_text", "review_text_len"),
    ("review_summary", "review_summary_len"),
];

/// One-hot encoded predictors
pub const CATEGORICAL_FEATURES: [&str; 2] = ["category", "fit"];

/// Keys a prediction request must carry
pub const REQUIRED_FEATURES: [&str; 7] =
    ["waist", "quality", "category", "bust", "height", "length", "fit"];

/// Target field holding the numeric size
pub const SIZE_FIELD: &str = "size";

/// Ordered size bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeCategory {
    S,
    M,
    L,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 3] = [SizeCategory::S, SizeCategory::M, SizeCategory::L];

    /// Bucket a numeric size: `<= 4` is S, `(4, 8]` is M, `> 8` is L
    pub fn from_size(size: f64) -> Option<Self> {
        if !size.is_finite() {
            None
        } else if size <= 4.0 {
            Some(SizeCategory::S)
        } else if size <= 8.0 {
            Some(SizeCategory::M)
        } else {
            Some(SizeCategory::L)
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            SizeCategory::S => "S",
            SizeCategory::M => "M",
            SizeCategory::L => "L",
        }
    }

    pub fn labels() -> Vec<String> {
        Self::ALL.iter().map(|c| c.label().to_string()).collect()
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coerce a JSON value to a finite number; anything else is missing
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    number.filter(|v| v.is_finite())
}

fn coerce_category(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_length(value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::String(s)) => s.chars().count() as f64,
        Some(other) => other.to_string().chars().count() as f64,
    }
}

/// Predictors of one record, before encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Values for `MEASUREMENT_FEATURES`
    pub measurements: [Option<f64>; 5],
    /// Character counts for `TEXT_FEATURES`
    pub text_lengths: [f64; 2],
    /// Values for `CATEGORICAL_FEATURES`
    pub categories: [Option<String>; 2],
}

impl FeatureRow {
    /// Lenient extraction: absent keys are treated as missing values
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let null = Value::Null;
        let field = |name: &str| record.get(name).unwrap_or(&null);

        Self {
            measurements: MEASUREMENT_FEATURES.map(|name| coerce_numeric(field(name))),
            text_lengths: TEXT_FEATURES.map(|(name, _)| text_length(record.get(name))),
            categories: CATEGORICAL_FEATURES.map(|name| coerce_category(field(name))),
        }
    }

    /// Strict extraction for prediction requests
    ///
    /// Every key in `REQUIRED_FEATURES` must be present. An explicit `null`
    /// counts as present and is imputed like any missing value.
    pub fn from_request(request: &Map<String, Value>) -> Result<Self> {
        if let Some(missing) = REQUIRED_FEATURES.iter().find(|k| !request.contains_key(**k)) {
            return Err(StyleSyncError::MissingFeature(missing.to_string()));
        }
        Ok(Self::from_record(request))
    }

    /// Strict extraction from any JSON value; non-objects are invalid input
    pub fn from_request_value(request: &Value) -> Result<Self> {
        match request {
            Value::Object(map) => Self::from_request(map),
            other => Err(StyleSyncError::InvalidInput(format!(
                "size features must be a JSON object, got {}",
                json_kind(other)
            ))),
        }
    }

    pub fn measurement(&self, name: &str) -> Option<f64> {
        MEASUREMENT_FEATURES
            .iter()
            .position(|&n| n == name)
            .and_then(|i| self.measurements[i])
    }

    /// Measurements followed by text lengths, in schema order
    pub fn continuous(&self) -> [Option<f64>; 7] {
        let [w, q, b, h, l] = self.measurements;
        let [t, s] = self.text_lengths;
        [w, q, b, h, l, Some(t), Some(s)]
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Names of the continuous columns, matching `FeatureRow::continuous`
pub fn continuous_feature_names() -> [&'static str; 7] {
    let [w, q, b, h, l] = MEASUREMENT_FEATURES;
    let [(_, t), (_, s)] = TEXT_FEATURES;
    [w, q, b, h, l, t, s]
}

/// A training row with a resolved target
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub features: FeatureRow,
    pub target: SizeCategory,
}

impl LabeledRow {
    /// `None` when the size is missing or not numeric
    pub fn from_record(record: &Map<String, Value>) -> Option<Self> {
        let target = record
            .get(SIZE_FIELD)
            .and_then(coerce_numeric)
            .and_then(SizeCategory::from_size)?;
        Some(Self {
            features: FeatureRow::from_record(record),
            target,
        })
    }
}

/// Parsed size data plus row accounting
#[derive(Debug, Clone, Default)]
pub struct SizeDataset {
    pub rows: Vec<LabeledRow>,
    /// Records dropped for an unresolved size
    pub dropped: usize,
}

impl SizeDataset {
    /// Build from already-parsed JSON records; non-objects are dropped
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut dataset = SizeDataset::default();
        for record in records {
            match record.as_object().and_then(LabeledRow::from_record) {
                Some(row) => dataset.rows.push(row),
                None => dataset.dropped += 1,
            }
        }
        dataset
    }

    /// Read a JSON-lines file; blank lines are skipped, malformed lines fail
    pub fn load_jsonl(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StyleSyncError::PathNotFound(path.to_path_buf()));
        }

        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line).map_err(|e| {
                StyleSyncError::Dataset(format!("{}:{}: {e}", path.display(), line_no + 1))
            })?;
            records.push(value);
        }

        let dataset = Self::from_records(&records);
        info!(
            "Loaded {} size records from {:?} ({} dropped without a usable size)",
            dataset.rows.len(),
            path,
            dataset.dropped
        );
        for (class, count) in dataset.class_counts().iter().enumerate() {
            debug!("  {}: {}", SizeCategory::ALL[class], count);
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.target.index()).collect()
    }

    pub fn class_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for row in &self.rows {
            counts[row.target.index()] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_size_buckets() {
        assert_eq!(SizeCategory::from_size(0.0), Some(SizeCategory::S));
        assert_eq!(SizeCategory::from_size(4.0), Some(SizeCategory::S));
        assert_eq!(SizeCategory::from_size(4.5), Some(SizeCategory::M));
        assert_eq!(SizeCategory::from_size(8.0), Some(SizeCategory::M));
        assert_eq!(SizeCategory::from_size(8.01), Some(SizeCategory::L));
        assert_eq!(SizeCategory::from_size(f64::NAN), None);
    }

    #[test]
    fn test_coerce_numeric() {
        assert_eq!(coerce_numeric(&json!(28)), Some(28.0));
        assert_eq!(coerce_numeric(&json!(" 34.5 ")), Some(34.5));
        assert_eq!(coerce_numeric(&json!("34d")), None);
        assert_eq!(coerce_numeric(&json!(null)), None);
        assert_eq!(coerce_numeric(&json!([1])), None);
        assert_eq!(coerce_numeric(&json!("inf")), None);
    }

    #[test]
    fn test_record_extraction() {
        let record = json!({
            "waist": "29", "quality": 5, "bust": "n/a", "height": 66,
            "category": "Dresses", "fit": null,
            "review_text": "Lovely", "size": 6
        });
        let row = LabeledRow::from_record(record.as_object().unwrap()).unwrap();

        assert_eq!(row.target, SizeCategory::M);
        assert_eq!(row.features.measurement("waist"), Some(29.0));
        assert_eq!(row.features.measurement("bust"), None);
        assert_eq!(row.features.measurement("length"), None);
        assert_eq!(row.features.text_lengths, [6.0, 0.0]);
        assert_eq!(row.features.categories, [Some("Dresses".to_string()), None]);
    }

    #[test]
    fn test_non_numeric_quality_is_missing() {
        let record = json!({"waist": 28, "quality": "great", "size": 2});
        let row = LabeledRow::from_record(record.as_object().unwrap()).unwrap();
        assert_eq!(row.features.measurement("quality"), None);

        let record = json!({"waist": 28, "quality": "4", "size": 2});
        let row = LabeledRow::from_record(record.as_object().unwrap()).unwrap();
        assert_eq!(row.features.measurement("quality"), Some(4.0));
    }

    #[test]
    fn test_unresolved_size_drops_row() {
        let records = vec![
            json!({"waist": 28, "size": 2}),
            json!({"waist": 28, "size": "large"}),
            json!({"waist": 28}),
            json!("not an object"),
        ];
        let dataset = SizeDataset::from_records(&records);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.dropped, 3);
        assert_eq!(dataset.class_counts(), [1, 0, 0]);
    }

    #[test]
    fn test_request_requires_every_key() {
        let full = json!({
            "waist": 28, "quality": 4, "category": "Dresses", "bust": 34,
            "height": 65, "length": 35, "fit": "Just Right"
        });
        assert!(FeatureRow::from_request_value(&full).is_ok());

        let mut partial = full.clone();
        partial.as_object_mut().unwrap().remove("bust");
        match FeatureRow::from_request_value(&partial) {
            Err(StyleSyncError::MissingFeature(key)) => assert_eq!(key, "bust"),
            other => panic!("expected MissingFeature, got {other:?}"),
        }

        let mut nulled = full.clone();
        nulled["height"] = Value::Null;
        let row = FeatureRow::from_request_value(&nulled).unwrap();
        assert_eq!(row.measurement("height"), None);

        assert!(matches!(
            FeatureRow::from_request_value(&json!([1, 2])),
            Err(StyleSyncError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_load_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sizes.jsonl");
        std::fs::write(
            &path,
            "{\"waist\": 27, \"size\": 3}\n\n{\"waist\": 33, \"size\": 12}\n{\"waist\": 30}\n",
        )
        .unwrap();

        let dataset = SizeDataset::load_jsonl(&path).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.dropped, 1);
        assert_eq!(dataset.labels(), vec![0, 2]);

        std::fs::write(&path, "{\"waist\": 27, \"size\": 3}\n{broken\n").unwrap();
        assert!(matches!(SizeDataset::load_jsonl(&path), Err(StyleSyncError::Dataset(_))));
        assert!(matches!(
            SizeDataset::load_jsonl(&dir.path().join("missing.jsonl")),
            Err(StyleSyncError::PathNotFound(_))
        ));
    }
}

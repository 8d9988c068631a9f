//! Metrics Module for Model Evaluation
//!
//! F1-centred evaluation for imbalanced classification:
//! - Weighted and macro F1 (zero-division counts as 0)
//! - Per-class precision, recall, F1 and support
//! - Low-metric flags for classes that need attention
//! - Confusion matrix

use serde::{Deserialize, Serialize};

/// Default threshold below which a class metric is flagged
pub const DEFAULT_LOW_METRIC_THRESHOLD: f64 = 0.7;

/// Evaluation metrics bundle, indexed by class position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Mean loss over the evaluated batches, when the caller tracked it
    pub loss: Option<f64>,

    /// Macro-averaged precision over labels seen in truth or predictions
    pub macro_precision: f64,

    /// Macro-averaged recall
    pub macro_recall: f64,

    /// Macro-averaged F1-score
    pub macro_f1: f64,

    /// Support-weighted F1-score
    pub weighted_f1: f64,

    /// Per-class metrics
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Create new metrics from predictions and ground truth labels
    ///
    /// Pairs with a label outside `0..num_classes` are ignored. Only the shorter
    /// of the two slices is consumed.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);
        let total_samples = confusion_matrix.total();
        if total_samples == 0 {
            return Self::empty(num_classes);
        }

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        // A label takes part in the macro average if it occurs in truth or predictions
        let predicted_counts = confusion_matrix.col_sums();
        let active: Vec<&ClassMetrics> = per_class
            .iter()
            .filter(|m| m.support > 0 || predicted_counts[m.class_idx] > 0)
            .collect();
        let num_active = active.len() as f64;

        let macro_avg = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if num_active > 0.0 {
                active.iter().map(|m| f(*m)).sum::<f64>() / num_active
            } else {
                0.0
            }
        };

        let macro_precision = macro_avg(|m: &ClassMetrics| m.precision);
        let macro_recall = macro_avg(|m: &ClassMetrics| m.recall);
        let macro_f1 = macro_avg(|m: &ClassMetrics| m.f1);

        let weighted_f1 = per_class
            .iter()
            .map(|m| m.f1 * m.support as f64)
            .sum::<f64>()
            / total_samples as f64;

        Self {
            total_samples,
            loss: None,
            macro_precision,
            macro_recall,
            macro_f1,
            weighted_f1,
            per_class,
            confusion_matrix,
        }
    }

    fn empty(num_classes: usize) -> Self {
        Self {
            total_samples: 0,
            loss: None,
            macro_precision: 0.0,
            macro_recall: 0.0,
            macro_f1: 0.0,
            weighted_f1: 0.0,
            per_class: (0..num_classes)
                .map(|class_idx| ClassMetrics {
                    class_idx,
                    ..Default::default()
                })
                .collect(),
            confusion_matrix: ConfusionMatrix::new(num_classes),
        }
    }

    /// Attach class names to the per-class entries
    pub fn with_class_names(mut self, names: &[String]) -> Self {
        for m in self.per_class.iter_mut() {
            m.class_name = names.get(m.class_idx).cloned();
        }
        self
    }

    pub fn precision(&self) -> Vec<f64> {
        self.per_class.iter().map(|m| m.precision).collect()
    }

    pub fn recall(&self) -> Vec<f64> {
        self.per_class.iter().map(|m| m.recall).collect()
    }

    pub fn f1(&self) -> Vec<f64> {
        self.per_class.iter().map(|m| m.f1).collect()
    }

    /// Classes whose F1, precision or recall is below `threshold`
    pub fn flagged_classes(&self, threshold: f64) -> Vec<ClassFlag> {
        self.per_class
            .iter()
            .filter_map(|m| {
                let mut issues = Vec::new();
                if m.f1 < threshold {
                    issues.push(LowMetric::F1(m.f1));
                }
                if m.precision < threshold {
                    issues.push(LowMetric::Precision(m.precision));
                }
                if m.recall < threshold {
                    issues.push(LowMetric::Recall(m.recall));
                }
                if issues.is_empty() {
                    None
                } else {
                    Some(ClassFlag {
                        class_idx: m.class_idx,
                        class_name: m.class_name.clone(),
                        issues,
                    })
                }
            })
            .collect()
    }

    /// Classification report in the familiar precision/recall/f1/support layout
    pub fn report(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{:>14} {:>10} {:>10} {:>10} {:>10}\n",
            "", "precision", "recall", "f1-score", "support"
        ));
        for m in &self.per_class {
            let label = m
                .class_name
                .clone()
                .unwrap_or_else(|| m.class_idx.to_string());
            output.push_str(&format!(
                "{:>14} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
                label, m.precision, m.recall, m.f1, m.support
            ));
        }
        output.push('\n');
        output.push_str(&format!(
            "{:>14} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.total_samples
        ));
        output.push_str(&format!(
            "{:>14} {:>10} {:>10} {:>10.4} {:>10}\n",
            "weighted avg", "", "", self.weighted_f1, self.total_samples
        ));
        output
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.report())
    }
}

/// A metric that fell below the flag threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LowMetric {
    F1(f64),
    Precision(f64),
    Recall(f64),
}

impl std::fmt::Display for LowMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LowMetric::F1(v) => write!(f, "F1 {:.3}", v),
            LowMetric::Precision(v) => write!(f, "precision {:.3}", v),
            LowMetric::Recall(v) => write!(f, "recall {:.3}", v),
        }
    }
}

/// A class flagged for low per-class metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassFlag {
    pub class_idx: usize,
    pub class_name: Option<String>,
    pub issues: Vec<LowMetric>,
}

impl std::fmt::Display for ClassFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.class_name {
            Some(name) => write!(f, "{}:", name)?,
            None => write!(f, "class {}:", self.class_idx)?,
        }
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, issue)?;
        }
        Ok(())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// Class name (if available)
    pub class_name: Option<String>,

    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Support = number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually other classes
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as other classes
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Row = actual, column = predicted, flat row-major
    pub matrix: Vec<usize>,
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Predicted class counts
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|col| (0..self.num_classes).map(|row| self.get(row, col)).sum())
            .collect()
    }

    /// Pretty print the confusion matrix
    pub fn display(&self, class_names: Option<&[String]>) -> String {
        let mut output = String::new();
        output.push_str("Confusion Matrix (rows=actual, cols=predicted):\n\n");

        let label = |idx: usize, width: usize| -> String {
            match class_names.and_then(|names| names.get(idx)) {
                Some(name) => name.chars().take(width).collect(),
                None => idx.to_string(),
            }
        };

        output.push_str("           ");
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>10}", label(col, 9)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>10} ", label(row, 10)));
            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    output.push_str(&format!("{:>10}", format!("[{}]", count)));
                } else {
                    output.push_str(&format!("{:>10}", count));
                }
            }
            output.push('\n');
        }

        output
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display(None))
    }
}

/// Running average for tracking losses during training
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!(approx(cm.accuracy(), 0.7));
    }

    #[test]
    fn test_weighted_and_macro_f1_match_reference_values() {
        // y_true = [0,0,0,1,1,2], y_pred = [0,0,1,1,2,2]
        // class 0: p=1.0, r=2/3, f1=0.8, support 3
        // class 1: p=0.5, r=0.5, f1=0.5, support 2
        // class 2: p=0.5, r=1.0, f1=2/3, support 1
        let truth = vec![0, 0, 0, 1, 1, 2];
        let preds = vec![0, 0, 1, 1, 2, 2];
        let m = Metrics::from_predictions(&preds, &truth, 3);

        assert!(approx(m.per_class[0].f1, 0.8));
        assert!(approx(m.per_class[1].f1, 0.5));
        assert!(approx(m.per_class[2].f1, 2.0 / 3.0));
        assert!(approx(m.macro_f1, (0.8 + 0.5 + 2.0 / 3.0) / 3.0));
        assert!(approx(m.weighted_f1, (0.8 * 3.0 + 0.5 * 2.0 + 2.0 / 3.0) / 6.0));
    }

    #[test]
    fn test_zero_division_counts_as_zero() {
        // Class 1 is never predicted: precision and F1 fall back to 0
        let truth = vec![0, 1, 1];
        let preds = vec![0, 0, 0];
        let m = Metrics::from_predictions(&preds, &truth, 2);

        assert_eq!(m.per_class[1].precision, 0.0);
        assert_eq!(m.per_class[1].f1, 0.0);
        assert!(m.weighted_f1.is_finite());
    }

    #[test]
    fn test_macro_ignores_labels_absent_from_truth_and_predictions() {
        let truth = vec![0, 1];
        let preds = vec![0, 1];
        let m = Metrics::from_predictions(&preds, &truth, 4);

        assert!(approx(m.macro_f1, 1.0));
        assert!(approx(m.weighted_f1, 1.0));
    }

    #[test]
    fn test_flagged_classes() {
        let truth = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let preds = vec![0, 0, 0, 0, 1, 0, 0, 0];
        let m = Metrics::from_predictions(&preds, &truth, 2)
            .with_class_names(&["dark".to_string(), "light".to_string()]);

        let flags = m.flagged_classes(DEFAULT_LOW_METRIC_THRESHOLD);
        // class 0: precision 4/7 flagged; class 1: recall 0.25 flagged
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[1].class_name.as_deref(), Some("light"));
        assert!(flags[1].issues.contains(&LowMetric::Recall(0.25)));
        assert_eq!(flags[1].to_string(), "light: F1 0.400, recall 0.250");
    }

    #[test]
    fn test_empty_predictions() {
        let m = Metrics::from_predictions(&[], &[], 3);
        assert_eq!(m.total_samples, 0);
        assert_eq!(m.per_class.len(), 3);
        assert_eq!(m.weighted_f1, 0.0);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 1, 0];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);
        let class0 = ClassMetrics::from_confusion_matrix(&cm, 0);

        assert_eq!(class0.true_positives, 2);
        assert_eq!(class0.false_positives, 1);
        assert_eq!(class0.false_negatives, 1);
        assert!(approx(class0.precision, 2.0 / 3.0));
        assert!(approx(class0.recall, 2.0 / 3.0));
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();
        avg.add(1.0);
        avg.add(2.0);
        avg.add(3.0);

        assert_eq!(avg.count(), 3);
        assert!(approx(avg.average(), 2.0));
    }

    #[test]
    fn test_report_lists_every_class() {
        let m = Metrics::from_predictions(&[0, 1], &[0, 1], 2)
            .with_class_names(&["dark".to_string(), "mid-light".to_string()]);
        let report = m.report();
        assert!(report.contains("dark"));
        assert!(report.contains("mid-light"));
        assert!(report.contains("weighted avg"));
    }
}

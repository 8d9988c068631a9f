//! Stratified train/validation split
//!
//! A single deterministic split that keeps every class's share of the data in
//! both partitions. The same seed always yields the same partition.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, StyleSyncError};

/// Configuration for the train/validation split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of each class held out for validation
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(validation_fraction: f64, seed: u64) -> Result<Self> {
        if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
            return Err(StyleSyncError::Config(
                "Validation fraction must be strictly between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(Self {
            validation_fraction,
            seed,
        })
    }
}

/// Indices of the training and validation partitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainValSplit {
    /// Training indices, ascending
    pub train: Vec<usize>,
    /// Validation indices, ascending
    pub validation: Vec<usize>,
}

impl TrainValSplit {
    /// Split item indices `0..labels.len()` by label
    ///
    /// Classes with at least two items keep at least one item on each side.
    /// A singleton class goes to training.
    pub fn stratified(labels: &[usize], config: &SplitConfig) -> Result<Self> {
        if labels.is_empty() {
            return Err(StyleSyncError::Dataset(
                "No items provided for splitting".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(idx);
        }

        let mut train = Vec::with_capacity(labels.len());
        let mut validation = Vec::new();

        for (_, mut members) in by_class {
            members.shuffle(&mut rng);

            let n = members.len();
            let n_val = if n < 2 {
                0
            } else {
                ((n as f64 * config.validation_fraction).round() as usize).clamp(1, n - 1)
            };

            validation.extend_from_slice(&members[..n_val]);
            train.extend_from_slice(&members[n_val..]);
        }

        train.sort_unstable();
        validation.sort_unstable();

        Ok(Self { train, validation })
    }

    /// Labels of the training partition, in index order
    pub fn train_labels(&self, labels: &[usize]) -> Vec<usize> {
        self.train.iter().map(|&i| labels[i]).collect()
    }

    /// Labels of the validation partition, in index order
    pub fn validation_labels(&self, labels: &[usize]) -> Vec<usize> {
        self.validation.iter().map(|&i| labels[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skewed_labels() -> Vec<usize> {
        let mut labels = Vec::new();
        for (class, count) in [120usize, 136, 147, 95].iter().enumerate() {
            labels.extend(std::iter::repeat(class).take(*count));
        }
        labels
    }

    #[test]
    fn test_split_preserves_class_proportions() {
        let labels = skewed_labels();
        let split = TrainValSplit::stratified(&labels, &SplitConfig::default()).unwrap();

        assert_eq!(split.train.len() + split.validation.len(), labels.len());

        let val_labels = split.validation_labels(&labels);
        for (class, total) in [120usize, 136, 147, 95].iter().enumerate() {
            let in_val = val_labels.iter().filter(|&&l| l == class).count();
            let expected = (*total as f64 * 0.2).round() as usize;
            assert_eq!(in_val, expected, "class {}", class);
        }
    }

    #[test]
    fn test_split_is_disjoint_and_sorted() {
        let labels = skewed_labels();
        let split = TrainValSplit::stratified(&labels, &SplitConfig::default()).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.validation).copied().collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), labels.len());
        assert!(split.validation.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_same_seed_same_split() {
        let labels = skewed_labels();
        let a = TrainValSplit::stratified(&labels, &SplitConfig::default()).unwrap();
        let b = TrainValSplit::stratified(&labels, &SplitConfig::default()).unwrap();
        assert_eq!(a, b);

        let other = SplitConfig { seed: 7, ..SplitConfig::default() };
        let c = TrainValSplit::stratified(&labels, &other).unwrap();
        assert_ne!(a.validation, c.validation);
    }

    #[test]
    fn test_small_classes_keep_both_sides() {
        let labels = vec![0, 0, 1, 2, 2, 2];
        let split = TrainValSplit::stratified(&labels, &SplitConfig::default()).unwrap();
        let val = split.validation_labels(&labels);
        let train = split.train_labels(&labels);

        assert!(val.contains(&0) && train.contains(&0));
        assert!(!val.contains(&1) && train.contains(&1));
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(SplitConfig::new(0.0, 42).is_err());
        assert!(SplitConfig::new(1.0, 42).is_err());
        assert!(SplitConfig::new(0.25, 42).is_ok());
    }

    #[test]
    fn test_empty_labels_is_error() {
        assert!(TrainValSplit::stratified(&[], &SplitConfig::default()).is_err());
    }
}

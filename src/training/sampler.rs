//! Class-balanced sampling
//!
//! Class weights are inversely proportional to class frequency in the
//! training partition. The same weights drive the sampler (one draw weight
//! per item) and the loss (one weight per class).

use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::utils::error::{Result, StyleSyncError};

/// Per-class weights `N / (K · count)` over the classes present in `labels`
///
/// `K` counts only classes with at least one item; an absent class gets
/// weight 0 and is never drawn.
pub fn class_weights(labels: &[usize], num_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; num_classes];
    for &label in labels {
        if label < num_classes {
            counts[label] += 1;
        }
    }

    let present = counts.iter().filter(|&&c| c > 0).count();
    let total: usize = counts.iter().sum();

    counts
        .iter()
        .map(|&count| {
            if count == 0 {
                0.0
            } else {
                total as f64 / (present as f64 * count as f64)
            }
        })
        .collect()
}

/// Draw weight of every item: the weight of its class
pub fn sample_weights(labels: &[usize], class_weights: &[f64]) -> Vec<f64> {
    labels
        .iter()
        .map(|&label| class_weights.get(label).copied().unwrap_or(0.0))
        .collect()
}

/// With-replacement sampler that equalizes expected draws per class
#[derive(Debug, Clone)]
pub struct BalancedSampler {
    distribution: WeightedIndex<f64>,
    num_samples: usize,
    rng: ChaCha8Rng,
}

impl BalancedSampler {
    /// One epoch draws as many items as there are labels
    pub fn new(labels: &[usize], num_classes: usize, seed: u64) -> Result<Self> {
        let weights = sample_weights(labels, &class_weights(labels, num_classes));
        let distribution = WeightedIndex::new(&weights).map_err(|e| {
            StyleSyncError::Dataset(format!("Cannot build balanced sampler: {e}"))
        })?;

        Ok(Self {
            distribution,
            num_samples: labels.len(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Item indices for one epoch; successive calls continue the RNG stream
    pub fn epoch_indices(&mut self) -> Vec<usize> {
        (0..self.num_samples)
            .map(|_| self.distribution.sample(&mut self.rng))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_class_weights_inverse_frequency() {
        let labels = [0, 0, 0, 1];
        let weights = class_weights(&labels, 2);
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_absent_class_gets_zero_weight() {
        let labels = [0, 0, 2];
        let weights = class_weights(&labels, 4);
        assert_eq!(weights[1], 0.0);
        assert_eq!(weights[3], 0.0);
        assert!((weights[0] - 0.75).abs() < 1e-12);
        assert!((weights[2] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_class_mass_is_equal() {
        let labels = [0, 0, 0, 0, 1, 1, 2];
        let w = sample_weights(&labels, &class_weights(&labels, 3));
        let mass: Vec<f64> = (0..3)
            .map(|c| labels.iter().zip(&w).filter(|(&l, _)| l == c).map(|(_, w)| w).sum())
            .collect();
        assert!((mass[0] - mass[1]).abs() < 1e-9);
        assert!((mass[1] - mass[2]).abs() < 1e-9);
    }

    #[test]
    fn test_draws_converge_to_equal_proportions() {
        let mut meta = ChaCha8Rng::seed_from_u64(99);

        for trial in 0..5 {
            let num_classes = meta.gen_range(2..=5);
            let mut labels = Vec::new();
            for class in 0..num_classes {
                let count = meta.gen_range(1..=200);
                labels.extend(std::iter::repeat(class).take(count));
            }

            let mut sampler = BalancedSampler::new(&labels, num_classes, trial).unwrap();
            let mut drawn = vec![0usize; num_classes];
            let mut total = 0usize;
            while total < 60_000 {
                for idx in sampler.epoch_indices() {
                    drawn[labels[idx]] += 1;
                    total += 1;
                }
            }

            let expected = 1.0 / num_classes as f64;
            for count in drawn {
                let share = count as f64 / total as f64;
                assert!((share - expected).abs() < 0.02, "trial {trial}: share {share}");
            }
        }
    }

    #[test]
    fn test_epoch_length_matches_labels() {
        let labels = vec![0, 1, 1, 1, 2];
        let mut sampler = BalancedSampler::new(&labels, 3, 42).unwrap();
        let indices = sampler.epoch_indices();
        assert_eq!(indices.len(), 5);
        assert!(indices.iter().all(|&i| i < labels.len()));
    }

    #[test]
    fn test_empty_labels_is_error() {
        assert!(BalancedSampler::new(&[], 3, 42).is_err());
    }
}

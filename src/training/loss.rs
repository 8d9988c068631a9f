//! Imbalance-focused loss
//!
//! Label-smoothed cross-entropy, scaled per sample by the weight of its true
//! class and modulated by a focal term `(1 - p_t)^γ`, averaged over the
//! batch. `p_t` is the probability mass the model assigns to the smoothed
//! target distribution.
//!
//! With smoothing `ε` over `C` classes the smoothed target is
//! `(1 - ε)·onehot + ε/C`, so both terms reduce to the true-class
//! log-probability and the row sum of log-probabilities:
//!
//! ```text
//! CE  = (1 - ε)·(-log p_true) + (ε/C)·Σ_c (-log p_c)
//! p_t = (1 - ε)·p_true + ε/C
//! ```

use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Lower bound on log-probabilities so `-log p` stays finite
const LOG_PROB_FLOOR: f64 = -100.0;

/// Smallest focal base, keeps the gradient of `x^γ` finite for `γ < 1`
const FOCAL_BASE_FLOOR: f64 = 1e-7;

/// Focal + label-smoothing loss with optional class weights
#[derive(Debug, Clone)]
pub struct ImbalanceFocusedLoss {
    class_weights: Option<Vec<f32>>,
    focal_gamma: f64,
    label_smoothing: f64,
}

impl ImbalanceFocusedLoss {
    pub fn new(class_weights: Option<Vec<f64>>, focal_gamma: f64, label_smoothing: f64) -> Self {
        Self {
            class_weights: class_weights.map(|w| w.into_iter().map(|v| v as f32).collect()),
            focal_gamma,
            label_smoothing,
        }
    }

    /// Unweighted variant: plain smoothed cross-entropy with the focal term
    pub fn unweighted(focal_gamma: f64, label_smoothing: f64) -> Self {
        Self::new(None, focal_gamma, label_smoothing)
    }

    pub fn class_weights(&self) -> Option<&[f32]> {
        self.class_weights.as_deref()
    }

    /// Per-sample loss, shape `[batch]`
    pub fn per_sample<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let [batch_size, num_classes] = logits.dims();
        let device = logits.device();
        let eps = self.label_smoothing;
        let uniform = eps / num_classes as f64;

        let log_probs = log_softmax(logits, 1).clamp_min(LOG_PROB_FLOOR);

        let log_p_true = log_probs
            .clone()
            .gather(1, targets.clone().reshape([batch_size, 1]))
            .reshape([batch_size]);
        let log_p_sum = log_probs.sum_dim(1).reshape([batch_size]);

        let mut ce = log_p_true.clone().neg().mul_scalar(1.0 - eps) + log_p_sum.neg().mul_scalar(uniform);

        if let Some(weights) = &self.class_weights {
            let weights = Tensor::<B, 1>::from_floats(
                TensorData::new(weights.clone(), [weights.len()]),
                &device,
            );
            ce = ce * weights.select(0, targets);
        }

        let p_t = log_p_true.exp().mul_scalar(1.0 - eps).add_scalar(uniform);
        let focal = p_t
            .neg()
            .add_scalar(1.0)
            .clamp_min(FOCAL_BASE_FLOOR)
            .powf_scalar(self.focal_gamma);

        focal * ce
    }

    /// Batch-mean loss, shape `[1]`
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        self.per_sample(logits, targets).mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray<f32>;

    fn logits(values: Vec<f32>, rows: usize, cols: usize) -> Tensor<TestBackend, 2> {
        Tensor::from_floats(TensorData::new(values, [rows, cols]), &Default::default())
    }

    fn targets(values: Vec<i64>) -> Tensor<TestBackend, 1, Int> {
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [n]), &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_loss_is_finite_and_non_negative() {
        let loss = ImbalanceFocusedLoss::new(Some(vec![0.5, 1.0, 2.0, 1.5]), 2.0, 0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..50 {
            let scale: f32 = if rng.gen_bool(0.2) { 1e4 } else { 5.0 };
            let values: Vec<f32> = (0..16).map(|_| rng.gen_range(-scale..scale)).collect();
            let t: Vec<i64> = (0..4).map(|_| rng.gen_range(0..4)).collect();

            let value = scalar(loss.forward(logits(values, 4, 4), targets(t)));
            assert!(value.is_finite(), "loss {value}");
            assert!(value >= 0.0);
        }
    }

    #[test]
    fn test_loss_decreases_with_true_class_confidence() {
        let loss = ImbalanceFocusedLoss::new(Some(vec![1.3, 0.7, 1.0]), 2.0, 0.1);
        let mut previous = f64::INFINITY;

        // Monotone below the margin where smoothing starts to dominate
        for step in 0..9 {
            let true_logit = -3.0 + step as f32;
            let value = scalar(loss.forward(logits(vec![0.0, true_logit, 0.0], 1, 3), targets(vec![1])));
            assert!(value < previous, "step {step}: {value} >= {previous}");
            previous = value;
        }
    }

    #[test]
    fn test_matches_hand_computed_value() {
        // Uniform logits: p = 1/C for every class
        let loss = ImbalanceFocusedLoss::unweighted(2.0, 0.1);
        let value = scalar(loss.forward(logits(vec![0.0; 4], 1, 4), targets(vec![2])));

        let ce = (4.0f64).ln();
        let p_t: f64 = 0.9 * 0.25 + 0.1 / 4.0;
        let expected = (1.0 - p_t).powi(2) * ce;
        assert!((value - expected).abs() < 1e-5, "{value} vs {expected}");
    }

    #[test]
    fn test_class_weight_scales_sample_loss() {
        let plain = ImbalanceFocusedLoss::unweighted(2.0, 0.1);
        let weighted = ImbalanceFocusedLoss::new(Some(vec![1.0, 3.0]), 2.0, 0.1);

        let a = scalar(plain.forward(logits(vec![0.2, -0.4], 1, 2), targets(vec![1])));
        let b = scalar(weighted.forward(logits(vec![0.2, -0.4], 1, 2), targets(vec![1])));
        assert!((b - 3.0 * a).abs() < 1e-5);
    }

    #[test]
    fn test_per_sample_shape() {
        let loss = ImbalanceFocusedLoss::unweighted(0.0, 0.0);
        let per = loss.per_sample(logits(vec![1.0, 0.0, 0.0, 1.0, 2.0, 0.0], 3, 2), targets(vec![0, 1, 1]));
        assert_eq!(per.dims(), [3]);
    }
}

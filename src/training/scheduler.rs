//! Learning Rate Scheduler Module
//!
//! Reduce-on-plateau scheduling driven by a validation metric. The training
//! loop feeds it weighted F1 in `Max` mode.

use serde::{Deserialize, Serialize};

/// Mode for plateau detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlateauMode {
    /// Metric should decrease (e.g., loss)
    Min,
    /// Metric should increase (e.g., F1)
    Max,
}

/// Reduce the learning rate when a metric stops improving
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceOnPlateau {
    best_metric: Option<f64>,
    epochs_without_improvement: usize,
    current_lr: f64,
    reduction_factor: f64,
    patience: usize,
    min_lr: f64,
    mode: PlateauMode,
    reductions: usize,
}

impl ReduceOnPlateau {
    /// Create a new reduce-on-plateau scheduler
    pub fn new(
        initial_lr: f64,
        reduction_factor: f64,
        patience: usize,
        min_lr: f64,
        mode: PlateauMode,
    ) -> Self {
        Self {
            best_metric: None,
            epochs_without_improvement: 0,
            current_lr: initial_lr,
            reduction_factor,
            patience,
            min_lr,
            mode,
            reductions: 0,
        }
    }

    /// Update the scheduler with a new metric value and return the learning rate
    ///
    /// Once more than `patience` consecutive epochs pass without strict
    /// improvement the rate is multiplied by the reduction factor (never below
    /// `min_lr`) and the counter starts over.
    pub fn step(&mut self, metric: f64) -> f64 {
        let improved = match (self.best_metric, self.mode) {
            (None, _) => !metric.is_nan(),
            (Some(best), PlateauMode::Min) => metric < best,
            (Some(best), PlateauMode::Max) => metric > best,
        };

        if improved {
            self.best_metric = Some(metric);
            self.epochs_without_improvement = 0;
            return self.current_lr;
        }

        self.epochs_without_improvement += 1;
        if self.epochs_without_improvement > self.patience {
            let new_lr = (self.current_lr * self.reduction_factor).max(self.min_lr);
            if new_lr < self.current_lr {
                self.current_lr = new_lr;
                self.reductions += 1;
            }
            self.epochs_without_improvement = 0;
        }

        self.current_lr
    }

    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    pub fn best_metric(&self) -> Option<f64> {
        self.best_metric
    }

    /// Number of reductions applied so far
    pub fn reductions(&self) -> usize {
        self.reductions
    }
}

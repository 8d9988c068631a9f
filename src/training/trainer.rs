//! Training loop for the skin-tone classifier
//!
//! This module implements the epoch loop using the Burn framework:
//! - Balanced-batch training with the imbalance-focused loss
//! - A single ordered validation pass per epoch, scored by weighted/macro F1
//! - Reduce-on-plateau learning rate driven by weighted F1
//! - Best-checkpoint saving and early stopping (`CheckpointPolicy`)
//! - Reload of the best checkpoint for the final report

use std::path::PathBuf;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::{PlaceholderCounter, SkinToneBatch, SkinToneBatcher, SkinToneItem};
use crate::model::cnn::{SkinToneClassifier, SkinToneClassifierConfig};
use crate::model::config::TrainingConfig;
use crate::training::checkpoint::{encode_record, Checkpoint};
use crate::training::loss::ImbalanceFocusedLoss;
use crate::training::sampler::BalancedSampler;
use crate::training::scheduler::{PlateauMode, ReduceOnPlateau};
use crate::utils::error::{Result, StyleSyncError};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{Metrics, RunningAverage};

/// Best-score tracking and early-stop bookkeeping
///
/// The first observed score always counts as an improvement; afterwards only
/// a strictly greater score does. Each non-improving epoch increments the
/// patience counter and an improvement resets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointPolicy {
    patience: usize,
    best: Option<f64>,
    best_epoch: Option<usize>,
    epochs_without_improvement: usize,
}

impl CheckpointPolicy {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            best_epoch: None,
            epochs_without_improvement: 0,
        }
    }

    /// Record an epoch's score; returns true when a checkpoint should be written
    pub fn observe(&mut self, epoch: usize, score: f64) -> bool {
        let improved = match self.best {
            None => !score.is_nan(),
            Some(best) => score > best,
        };

        if improved {
            self.best = Some(score);
            self.best_epoch = Some(epoch);
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;
        }
        improved
    }

    pub fn should_stop(&self) -> bool {
        self.epochs_without_improvement >= self.patience
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Patience exhausted after this epoch (0-indexed)
    EarlyStopped { epoch: usize },
    /// Ran the configured maximum number of epochs
    MaxEpochs,
}

/// Per-epoch summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub learning_rate: f64,
    pub weighted_f1: f64,
    pub macro_f1: f64,
    pub improved: bool,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub stop_reason: StopReason,
    pub history: Vec<EpochRecord>,
    pub best_epoch: usize,
    pub best_weighted_f1: f64,
    /// Validation metrics of the reloaded best checkpoint
    pub final_metrics: Metrics,
    pub checkpoint_path: PathBuf,
}

impl TrainingOutcome {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }
}

/// AdamW configured from the run settings
pub fn adamw_optimizer<B: AutodiffBackend>(
    config: &TrainingConfig,
) -> impl Optimizer<SkinToneClassifier<B>, B> {
    AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .init::<B, SkinToneClassifier<B>>()
}

/// Main trainer for the SkinToneClassifier
pub struct Trainer<B: AutodiffBackend, O: Optimizer<SkinToneClassifier<B>, B>> {
    /// Model being trained
    pub model: SkinToneClassifier<B>,
    optimizer: O,
    architecture: SkinToneClassifierConfig,
    config: TrainingConfig,
    class_weights: Vec<f64>,
    loss: ImbalanceFocusedLoss,
    scheduler: ReduceOnPlateau,
    policy: CheckpointPolicy,
    batcher: SkinToneBatcher,
    placeholders: Option<PlaceholderCounter>,
    show_progress: bool,
    device: B::Device,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SkinToneClassifier<B>, B>,
{
    /// Create a trainer; `class_weights` feed both the loss and the checkpoint
    pub fn new(
        model: SkinToneClassifier<B>,
        architecture: SkinToneClassifierConfig,
        optimizer: O,
        config: TrainingConfig,
        class_weights: Vec<f64>,
        device: B::Device,
    ) -> Self {
        let loss = ImbalanceFocusedLoss::new(
            Some(class_weights.clone()),
            config.focal_gamma,
            config.label_smoothing,
        );
        let scheduler = ReduceOnPlateau::new(
            config.learning_rate,
            config.plateau_factor,
            config.plateau_patience,
            config.min_learning_rate,
            PlateauMode::Max,
        );

        Self {
            model,
            optimizer,
            batcher: SkinToneBatcher::new(architecture.input_size),
            architecture,
            policy: CheckpointPolicy::new(config.early_stopping_patience),
            config,
            class_weights,
            loss,
            scheduler,
            placeholders: None,
            show_progress: true,
            device,
        }
    }

    /// Fail an epoch when too many loads fell back to placeholders
    pub fn with_placeholder_guard(mut self, counter: PlaceholderCounter) -> Self {
        self.placeholders = Some(counter);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn current_lr(&self) -> f64 {
        self.scheduler.get_lr()
    }

    pub fn policy(&self) -> &CheckpointPolicy {
        &self.policy
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    /// Train for one epoch over `indices` (drawn by the balanced sampler)
    ///
    /// Returns the mean batch loss.
    pub fn train_epoch<D: Dataset<SkinToneItem>>(&mut self, dataset: &D, indices: &[usize]) -> Result<f64> {
        let lr = self.scheduler.get_lr();
        let batch_size = self.config.batch_size;
        let pb = self.progress_bar(indices.len());
        let mut average = RunningAverage::new();

        for chunk in indices.chunks(batch_size) {
            let items: Vec<SkinToneItem> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch: SkinToneBatch<B> = self.batcher.batch(items, &self.device);
            let logits = self.model.forward(batch.images);
            let loss = self.loss.forward(logits, batch.targets);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                pb.abandon();
                return Err(StyleSyncError::Training(format!(
                    "non-finite loss ({loss_value}) at learning rate {lr:e}"
                )));
            }
            average.add(loss_value);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self.optimizer.step(lr, self.model.clone(), grads);

            pb.inc(chunk.len() as u64);
            pb.set_message(format!("loss {:.4}", average.average()));
        }

        pb.finish_and_clear();
        debug!("Trained {} batches, mean loss {:.4}", average.count(), average.average());
        Ok(average.average())
    }

    /// One ordered pass over the validation set without gradient tracking
    pub fn evaluate<D: Dataset<SkinToneItem>>(&self, dataset: &D) -> Metrics {
        let model = self.model.valid();
        let mut predictions = Vec::with_capacity(dataset.len());
        let mut truth = Vec::with_capacity(dataset.len());
        let mut loss = RunningAverage::new();

        let indices: Vec<usize> = (0..dataset.len()).collect();
        for chunk in indices.chunks(self.config.batch_size) {
            let items: Vec<SkinToneItem> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let n = items.len();
            let batch: SkinToneBatch<B::InnerBackend> = self.batcher.batch(items, &self.device);
            let logits = model.forward(batch.images);

            let batch_loss: f64 = self
                .loss
                .forward(logits.clone(), batch.targets.clone())
                .into_scalar()
                .elem();
            loss.add(batch_loss);

            predictions.extend(
                logits
                    .argmax(1)
                    .reshape([n])
                    .into_data()
                    .iter::<i64>()
                    .map(|p| p as usize),
            );
            truth.extend(batch.targets.into_data().iter::<i64>().map(|t| t as usize));
        }

        let mut metrics = Metrics::from_predictions(&predictions, &truth, self.architecture.num_classes)
            .with_class_names(&self.config.class_names);
        metrics.loss = Some(loss.average());
        metrics
    }

    fn check_placeholders(&self) -> Result<()> {
        let Some(counter) = &self.placeholders else {
            return Ok(());
        };
        let rate = counter.rate();
        if counter.substituted() > 0 {
            warn!(
                "{} of {} image loads used a placeholder this epoch ({:.1}%)",
                counter.substituted(),
                counter.total(),
                rate * 100.0
            );
        }
        if rate > self.config.max_placeholder_rate {
            return Err(StyleSyncError::Dataset(format!(
                "placeholder rate {:.1}% exceeds the limit of {:.1}%",
                rate * 100.0,
                self.config.max_placeholder_rate * 100.0
            )));
        }
        Ok(())
    }

    fn save_checkpoint(&self, epoch: usize, metrics: &Metrics) -> Result<()> {
        let optimizer_state = encode_record::<B, _>(self.optimizer.to_record())?;
        Checkpoint::capture(
            &self.model,
            &self.architecture,
            Some(optimizer_state),
            epoch,
            metrics.weighted_f1,
            &self.class_weights,
            &self.config.class_names,
            metrics,
        )?
        .save(&self.config.checkpoint_path())
    }

    /// Run the full epoch loop, then reload and re-evaluate the best checkpoint
    pub fn fit<DT, DV>(
        &mut self,
        train: &DT,
        validation: &DV,
        sampler: &mut BalancedSampler,
    ) -> Result<TrainingOutcome>
    where
        DT: Dataset<SkinToneItem>,
        DV: Dataset<SkinToneItem>,
    {
        if validation.is_empty() {
            return Err(StyleSyncError::Dataset("validation set is empty".to_string()));
        }

        let checkpoint_path = self.config.checkpoint_path();
        let max_epochs = self.config.max_epochs;
        let mut logger = TrainingLogger::new(max_epochs);
        let mut history = Vec::new();
        let mut stop_reason = StopReason::MaxEpochs;

        for epoch in 0..max_epochs {
            let lr = self.scheduler.get_lr();
            logger.start_epoch(epoch, lr);
            if let Some(counter) = &self.placeholders {
                counter.reset();
            }

            let indices = sampler.epoch_indices();
            let train_loss = self.train_epoch(train, &indices)?;
            let metrics = self.evaluate(validation);
            self.check_placeholders()?;

            logger.end_epoch(train_loss, metrics.weighted_f1, metrics.macro_f1, lr);
            for flag in metrics.flagged_classes(self.config.low_metric_threshold) {
                debug!("Epoch {} flag: {}", epoch + 1, flag);
            }

            let previous = self.policy.best();
            let improved = self.policy.observe(epoch, metrics.weighted_f1);
            if improved {
                logger.log_new_best(previous, metrics.weighted_f1);
                self.save_checkpoint(epoch, &metrics)?;
            }

            history.push(EpochRecord {
                epoch,
                train_loss,
                learning_rate: lr,
                weighted_f1: metrics.weighted_f1,
                macro_f1: metrics.macro_f1,
                improved,
            });

            let new_lr = self.scheduler.step(metrics.weighted_f1);
            if new_lr < lr {
                info!("Learning rate reduced: {:.2e} -> {:.2e}", lr, new_lr);
            }

            if self.policy.should_stop() {
                logger.log_early_stop(self.config.early_stopping_patience);
                stop_reason = StopReason::EarlyStopped { epoch };
                break;
            }
        }

        let (best_epoch, best_weighted_f1) = match (self.policy.best_epoch(), self.policy.best()) {
            (Some(epoch), Some(score)) => (epoch, score),
            _ => {
                return Err(StyleSyncError::Training(
                    "no epoch produced a usable validation score".to_string(),
                ))
            }
        };
        logger.log_complete(history.len(), best_weighted_f1);

        let checkpoint = Checkpoint::load(&checkpoint_path)?;
        self.model = checkpoint.load_model::<B>(&self.device)?;
        info!("Reloaded best checkpoint from epoch {}", checkpoint.epoch + 1);

        let final_metrics = self.evaluate(validation);

        Ok(TrainingOutcome {
            stop_reason,
            history,
            best_epoch,
            best_weighted_f1,
            final_metrics,
            checkpoint_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::sampler::class_weights;
    use burn::backend::Autodiff;
    use burn::data::dataset::InMemDataset;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    const SIZE: usize = 8;

    fn item(label: usize, level: f32) -> SkinToneItem {
        SkinToneItem {
            image: vec![level; 3 * SIZE * SIZE],
            label,
            path: format!("synthetic/{label}"),
        }
    }

    fn synthetic(per_class: &[(usize, usize)]) -> InMemDataset<SkinToneItem> {
        let mut items = Vec::new();
        for &(label, count) in per_class {
            for i in 0..count {
                let base = if label == 0 { 0.15 } else { 0.85 };
                items.push(item(label, base + 0.01 * (i % 5) as f32));
            }
        }
        InMemDataset::new(items)
    }

    fn config(dir: &TempDir, max_epochs: usize, patience: usize, lr: f64) -> TrainingConfig {
        TrainingConfig {
            output_dir: dir.path().to_path_buf(),
            class_names: vec!["dark".into(), "light".into()],
            image_size: SIZE,
            batch_size: 4,
            learning_rate: lr,
            max_epochs,
            early_stopping_patience: patience,
            ..Default::default()
        }
    }

    fn run(config: TrainingConfig) -> TrainingOutcome {
        let device = Default::default();
        let architecture = SkinToneClassifierConfig::new()
            .with_num_classes(2)
            .with_input_size(SIZE)
            .with_base_filters(2)
            .with_hidden_units(8);
        let model = architecture.init::<TestBackend>(&device);

        let train = synthetic(&[(0, 12), (1, 4)]);
        let val = synthetic(&[(0, 5), (1, 3)]);
        let labels: Vec<usize> = (0..train.len()).filter_map(|i| train.get(i)).map(|it| it.label).collect();
        let weights = class_weights(&labels, 2);
        let mut sampler = BalancedSampler::new(&labels, 2, config.seed).unwrap();

        let optimizer = adamw_optimizer::<TestBackend>(&config);
        let mut trainer = Trainer::new(model, architecture, optimizer, config, weights, device)
            .with_progress(false);
        trainer.fit(&train, &val, &mut sampler).unwrap()
    }

    #[test]
    fn test_policy_first_epoch_always_improves() {
        let mut policy = CheckpointPolicy::new(3);
        assert!(policy.observe(0, 0.0));
        assert_eq!(policy.best(), Some(0.0));
        assert_eq!(policy.best_epoch(), Some(0));
    }

    #[test]
    fn test_policy_requires_strict_improvement() {
        let mut policy = CheckpointPolicy::new(3);
        assert!(policy.observe(0, 0.5));
        assert!(!policy.observe(1, 0.5));
        assert!(policy.observe(2, 0.6));
        assert!(!policy.observe(3, 0.55));
        assert_eq!(policy.best_epoch(), Some(2));
        assert_eq!(policy.epochs_without_improvement(), 1);
    }

    #[test]
    fn test_policy_stops_exactly_at_patience() {
        let mut policy = CheckpointPolicy::new(2);
        policy.observe(0, 0.7);
        policy.observe(1, 0.6);
        assert!(!policy.should_stop());
        policy.observe(2, 0.6);
        assert!(policy.should_stop());
    }

    #[test]
    fn test_policy_improvement_resets_patience() {
        let mut policy = CheckpointPolicy::new(2);
        policy.observe(0, 0.1);
        policy.observe(1, 0.05);
        policy.observe(2, 0.2);
        assert_eq!(policy.epochs_without_improvement(), 0);
        assert!(!policy.should_stop());
    }

    #[test]
    fn test_fit_keeps_best_checkpoint() {
        let dir = TempDir::new().unwrap();
        let outcome = run(config(&dir, 4, 10, 1e-2));

        assert_eq!(outcome.stop_reason, StopReason::MaxEpochs);
        assert_eq!(outcome.epochs_run(), 4);

        let max_f1 = outcome
            .history
            .iter()
            .map(|r| r.weighted_f1)
            .fold(f64::NEG_INFINITY, f64::max);
        let first_best = outcome
            .history
            .iter()
            .find(|r| r.weighted_f1 == max_f1)
            .map(|r| r.epoch)
            .unwrap();

        let checkpoint = Checkpoint::load(&outcome.checkpoint_path).unwrap();
        assert!((checkpoint.best_weighted_f1 - max_f1).abs() < 1e-12);
        assert_eq!(checkpoint.epoch, first_best);
        assert_eq!(outcome.best_epoch, first_best);
        assert!(checkpoint.optimizer_state.is_some());
        assert!((outcome.final_metrics.weighted_f1 - max_f1).abs() < 1e-9);
    }

    #[test]
    fn test_fit_stops_early_without_improvement() {
        let dir = TempDir::new().unwrap();
        let outcome = run(config(&dir, 20, 2, 1e-12));

        assert!(matches!(outcome.stop_reason, StopReason::EarlyStopped { .. }));
        let last_improved = outcome.history.iter().rposition(|r| r.improved).unwrap();
        assert!(outcome.epochs_run() - 1 - last_improved <= 2);
        assert!(outcome.epochs_run() < 20);
    }

    #[test]
    fn test_fit_reduces_lr_on_plateau() {
        let dir = TempDir::new().unwrap();
        let config = TrainingConfig {
            plateau_patience: 1,
            ..config(&dir, 5, 10, 1e-12)
        };
        let outcome = run(config);

        assert_eq!(outcome.epochs_run(), 5);
        // One bad epoch is within patience
        assert_eq!(outcome.history[0].learning_rate, 1e-12);
        assert_eq!(outcome.history[1].learning_rate, 1e-12);
        let last = outcome.history.last().unwrap();
        assert!(last.learning_rate < 1e-12);
        assert!(last.learning_rate >= 0.7 * 0.7 * 1e-12 * (1.0 - 1e-9));
    }
}

//! End-to-end skin-tone training run
//!
//! Indexes the dataset, performs the stratified split, derives class weights
//! from the training partition, builds the balanced sampler and trains with
//! the `Trainer`. Prints the final per-class report of the best checkpoint.

use burn::tensor::backend::AutodiffBackend;
use colored::Colorize;
use tracing::info;

use crate::dataset::{
    PlaceholderCounter, SkinToneBurnDataset, SkinToneDataset, SplitConfig, TrainValSplit,
};
use crate::model::config::TrainingConfig;
use crate::training::sampler::{class_weights, BalancedSampler};
use crate::training::trainer::{adamw_optimizer, StopReason, Trainer, TrainingOutcome};
use crate::utils::error::{Result, StyleSyncError};

/// Run training with the given configuration
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: B::Device,
) -> Result<TrainingOutcome> {
    config.validate()?;
    println!("{}", "Initializing Training...".green().bold());
    println!("  Device: {:?}", device);

    println!("{}", "Loading Dataset...".cyan());
    let dataset = SkinToneDataset::with_classes(&config.data_dir, &config.class_names)?;
    let stats = dataset.get_stats();
    stats.print();
    stats.log_summary();

    let labels = dataset.labels();
    let split_config = SplitConfig::new(config.validation_fraction, config.seed)?;
    let split = TrainValSplit::stratified(&labels, &split_config)?;
    if split.validation.is_empty() {
        return Err(StyleSyncError::Dataset(
            "every class needs at least two images for a validation split".to_string(),
        ));
    }

    let num_classes = config.num_classes();
    let train_labels = split.train_labels(&labels);
    let weights = class_weights(&train_labels, num_classes);

    println!();
    println!("{}", "Dataset Splits:".cyan().bold());
    println!("  Training samples:   {}", split.train.len());
    println!("  Validation samples: {}", split.validation.len());
    println!("{}", "Class Weights:".cyan().bold());
    for (name, weight) in config.class_names.iter().zip(&weights) {
        println!("  {:<12} {:.3}", name, weight);
    }

    let placeholders = PlaceholderCounter::new();
    let train_dataset = SkinToneBurnDataset::train(
        dataset.pairs(&split.train),
        config.image_size,
        config.augmentation.clone(),
        config.seed,
        placeholders.clone(),
    );
    let val_dataset = SkinToneBurnDataset::eval(
        dataset.pairs(&split.validation),
        config.image_size,
        placeholders.clone(),
    );
    let mut sampler = BalancedSampler::new(&train_labels, num_classes, config.seed)?;

    B::seed(&device, config.seed);
    let architecture = config.model_config();
    let model = architecture.init::<B>(&device);
    let optimizer = adamw_optimizer::<B>(config);

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Max epochs:     {}", config.max_epochs);
    println!("  Patience:       {}", config.early_stopping_patience);
    println!("  Batch size:     {}", config.batch_size);
    println!("  Learning rate:  {}", config.learning_rate);
    println!("  Focal gamma:    {}", config.focal_gamma);
    println!("  Smoothing:      {}", config.label_smoothing);
    println!("  Checkpoint:     {:?}", config.checkpoint_path());
    println!();
    println!("{}", "Starting Training...".green().bold());

    let mut trainer = Trainer::new(
        model,
        architecture,
        optimizer,
        config.clone(),
        weights,
        device,
    )
    .with_placeholder_guard(placeholders);
    let outcome = trainer.fit(&train_dataset, &val_dataset, &mut sampler)?;

    print_summary(config, &outcome);
    info!(
        "Training finished: best weighted F1 {:.4} at epoch {}",
        outcome.best_weighted_f1,
        outcome.best_epoch + 1
    );
    Ok(outcome)
}

fn print_summary(config: &TrainingConfig, outcome: &TrainingOutcome) {
    println!();
    println!("{}", "Training Complete".green().bold());
    match outcome.stop_reason {
        StopReason::EarlyStopped { epoch } => {
            println!("  Stopped early after epoch {}", epoch + 1)
        }
        StopReason::MaxEpochs => println!("  Ran all {} epochs", outcome.epochs_run()),
    }
    println!(
        "  Best weighted F1: {} (epoch {})",
        format!("{:.4}", outcome.best_weighted_f1).green().bold(),
        outcome.best_epoch + 1
    );
    println!("  Checkpoint: {:?}", outcome.checkpoint_path);

    let metrics = &outcome.final_metrics;
    println!();
    println!("{}", "Best Checkpoint Validation Report:".cyan().bold());
    print!("{}", metrics.report());
    println!();
    print!("{}", metrics.confusion_matrix.display(Some(config.class_names.as_slice())));

    let flags = metrics.flagged_classes(config.low_metric_threshold);
    if flags.is_empty() {
        println!("{}", "All classes at or above the metric threshold".green());
    } else {
        println!(
            "{}",
            format!("Classes below {:.2}:", config.low_metric_threshold).yellow().bold()
        );
        for flag in flags {
            println!("  {}", flag.to_string().yellow());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::checkpoint::Checkpoint;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};
    use std::path::Path;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn write_class(root: &Path, class: &str, count: usize, shade: u8) {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let img = ImageBuffer::from_pixel(10, 10, Rgb([shade, shade.saturating_sub(20), shade / 2]));
            img.save(dir.join(format!("img_{i:03}.png"))).unwrap();
        }
    }

    fn tiny_config(data: &TempDir, out: &TempDir) -> TrainingConfig {
        TrainingConfig {
            data_dir: data.path().to_path_buf(),
            output_dir: out.path().to_path_buf(),
            class_names: vec!["dark".into(), "light".into()],
            image_size: 8,
            batch_size: 4,
            max_epochs: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_training_writes_best_checkpoint() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_class(data.path(), "dark", 8, 40);
        write_class(data.path(), "light", 5, 220);

        let config = tiny_config(&data, &out);
        let outcome = run_training::<TestBackend>(&config, Default::default()).unwrap();

        assert!(outcome.epochs_run() <= 2);
        let checkpoint = Checkpoint::load(&config.checkpoint_path()).unwrap();
        assert_eq!(checkpoint.class_names, config.class_names);
        assert_eq!(checkpoint.class_weights.len(), 2);
        assert!(checkpoint.class_weights[1] > checkpoint.class_weights[0]);
    }

    #[test]
    fn test_run_training_fails_on_unreadable_dataset() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        for class in ["dark", "light"] {
            let dir = data.path().join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..3 {
                std::fs::write(dir.join(format!("broken_{i}.jpg")), b"garbage").unwrap();
            }
        }

        let config = tiny_config(&data, &out);
        let result = run_training::<TestBackend>(&config, Default::default());
        assert!(matches!(result, Err(StyleSyncError::Dataset(_))));
        assert!(!config.checkpoint_path().exists());
    }

    #[test]
    fn test_run_training_rejects_invalid_config() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let config = TrainingConfig { batch_size: 0, ..tiny_config(&data, &out) };
        assert!(matches!(
            run_training::<TestBackend>(&config, Default::default()),
            Err(StyleSyncError::Config(_))
        ));
    }
}

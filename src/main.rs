//! StylesSync AI CLI
//!
//! Entry point for dataset statistics, skin-tone training and inference, and
//! the size model.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use stylesync_ai::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use stylesync_ai::dataset::{AugmentationConfig, SkinToneDataset, IMAGE_EXTENSIONS};
use stylesync_ai::inference::SkinTonePredictor;
use stylesync_ai::model::TrainingConfig;
use stylesync_ai::sizing::{SizeModelConfig, TrainedSizeModel, UntrainedSizeModel};
use stylesync_ai::training::run_training;
use stylesync_ai::utils::logging::{init_logging, LogConfig};

/// Skin-tone classification and garment size prediction
#[derive(Parser, Debug)]
#[command(name = "stylesync")]
#[command(version)]
#[command(about = "Skin-tone classification and size prediction with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show per-class counts and imbalance severity
    Stats {
        /// Path to the dataset directory (one subdirectory per class)
        #[arg(short, long, default_value = "data/skin_tones")]
        data_dir: PathBuf,
    },

    /// Train the skin-tone classifier
    Train {
        /// TOML file with training settings; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to the dataset directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Output directory for the best checkpoint
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Maximum number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Initial learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Epochs without weighted-F1 improvement before stopping
        #[arg(long)]
        patience: Option<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Disable training-time augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,
    },

    /// Predict the skin tone of an image or every image in a directory
    Infer {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Path to the best checkpoint
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Fit, evaluate and save the size model
    TrainSize {
        /// TOML file with size-model settings; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON-lines data file
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Where to write the fitted model
        #[arg(short, long, default_value = "models/size_model.json")]
        output: PathBuf,

        /// Fraction of each size held out for evaluation
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Random seed for the split
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Predict a size from a JSON feature mapping
    PredictSize {
        /// Path to a fitted size model
        #[arg(short, long)]
        model: PathBuf,

        /// Features, e.g. '{"waist": 28, "quality": 4, ...}'
        #[arg(short, long)]
        features: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Stats { data_dir } => cmd_stats(&data_dir),

        Commands::Train {
            config,
            data_dir,
            output_dir,
            epochs,
            batch_size,
            learning_rate,
            patience,
            seed,
            no_augmentation,
        } => {
            let mut training = match config {
                Some(path) => TrainingConfig::from_toml(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => TrainingConfig::default(),
            };
            if let Some(v) = data_dir {
                training.data_dir = v;
            }
            if let Some(v) = output_dir {
                training.output_dir = v;
            }
            if let Some(v) = epochs {
                training.max_epochs = v;
            }
            if let Some(v) = batch_size {
                training.batch_size = v;
            }
            if let Some(v) = learning_rate {
                training.learning_rate = v;
            }
            if let Some(v) = patience {
                training.early_stopping_patience = v;
            }
            if let Some(v) = seed {
                training.seed = v;
            }
            if no_augmentation {
                training.augmentation = AugmentationConfig::none();
            }

            println!("  Backend: {}", backend_name());
            run_training::<TrainingBackend>(&training, default_device())
                .context("skin-tone training failed")?;
            Ok(())
        }

        Commands::Infer { input, model } => cmd_infer(&input, &model),

        Commands::TrainSize {
            config,
            data,
            output,
            test_fraction,
            seed,
        } => {
            let mut size_config = match config {
                Some(path) => SizeModelConfig::from_toml(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SizeModelConfig::default(),
            };
            if let Some(v) = data {
                size_config.data_path = v;
            }
            if let Some(v) = test_fraction {
                size_config.test_fraction = v;
            }
            if let Some(v) = seed {
                size_config.seed = v;
            }
            cmd_train_size(size_config, &output)
        }

        Commands::PredictSize { model, features } => cmd_predict_size(&model, &features),
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔════════════════════════════════════════════════════╗
 ║   StylesSync AI                                    ║
 ║   Skin-Tone Classification + Size Prediction       ║
 ╚════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    let dataset = SkinToneDataset::new(data_dir)
        .with_context(|| format!("indexing {}", data_dir.display()))?;
    let stats = dataset.get_stats();
    stats.print();
    stats.log_summary();
    Ok(())
}

fn cmd_infer(input: &Path, model: &Path) -> Result<()> {
    info!("Running inference on {:?} with {:?}", input, model);

    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  Input:   {}", input.display());
    println!("  Model:   {}", model.display());
    println!("  Backend: {}", backend_name());
    println!();

    if !input.exists() {
        bail!("input path not found: {}", input.display());
    }

    let predictor = SkinTonePredictor::<DefaultBackend>::from_checkpoint(model, default_device())
        .with_context(|| format!("loading checkpoint {}", model.display()))?;

    let files: Vec<PathBuf> = if input.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    } else {
        vec![input.to_path_buf()]
    };

    if files.is_empty() {
        println!("{}", "No images found".yellow());
        return Ok(());
    }

    for path in &files {
        match predictor.predict_path(path) {
            Ok(result) => println!("{}", result.display(predictor.class_names())),
            Err(e) => println!("{} {}: {}", "Skipped".yellow(), path.display(), e),
        }
    }

    Ok(())
}

fn cmd_train_size(config: SizeModelConfig, output: &Path) -> Result<()> {
    println!("{}", "Training Size Model...".green().bold());
    println!("  Data:          {}", config.data_path.display());
    println!("  Test fraction: {}", config.test_fraction);
    println!("  Seed:          {}", config.seed);
    println!();

    let (model, evaluation) = UntrainedSizeModel::new(config)
        .fit_from_file()
        .context("size model training failed")?;

    println!("{}", "Size Model Evaluation:".cyan().bold());
    print!("{}", evaluation.report());

    model.save(output)?;
    println!();
    println!("{} {}", "Saved to".green(), output.display());
    Ok(())
}

fn cmd_predict_size(model_path: &Path, features: &str) -> Result<()> {
    let model = TrainedSizeModel::load(model_path)
        .with_context(|| format!("loading size model {}", model_path.display()))?;
    let features: serde_json::Value =
        serde_json::from_str(features).context("--features is not valid JSON")?;

    let prediction = model.predict_value(&features)?;
    println!(
        "Predicted size: {} (confidence {:.2}%)",
        prediction.label.green().bold(),
        prediction.confidence * 100.0
    );
    for (label, probability) in &prediction.probabilities {
        println!("  {:<2} {:>6.2}%", label, probability * 100.0);
    }
    Ok(())
}

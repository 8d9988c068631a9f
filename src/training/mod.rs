//! Training module for the skin-tone classifier
//!
//! This module provides:
//! - Class weighting and the balanced sampler
//! - The imbalance-focused loss (label smoothing + focal modulation)
//! - Reduce-on-plateau learning-rate scheduling
//! - Atomic best-model checkpoints
//! - The epoch loop with F1-driven checkpointing and early stopping
//! - The end-to-end `run_training` entry point

pub mod checkpoint;
pub mod loss;
pub mod sampler;
pub mod scheduler;
pub mod supervised;
pub mod trainer;

// Re-export main types for convenience
pub use checkpoint::Checkpoint;
pub use loss::ImbalanceFocusedLoss;
pub use sampler::{class_weights, sample_weights, BalancedSampler};
pub use scheduler::{PlateauMode, ReduceOnPlateau};
pub use supervised::run_training;
pub use trainer::{CheckpointPolicy, StopReason, Trainer, TrainingOutcome};

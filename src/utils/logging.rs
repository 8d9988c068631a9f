//! Logging Module
//!
//! Structured logging on top of the `tracing` crate. `RUST_LOG` overrides the
//! configured level when set.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::utils::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }

    /// Plain output for log collectors
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: true,
            include_thread_ids: false,
            ansi_colors: false,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Initialize logging with the given configuration
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_ansi(config.ansi_colors)
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_ids),
        )
        .with(filter)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Training progress logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize, learning_rate: f64) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!(
            "Epoch {}/{} started (lr = {:.6})",
            epoch + 1,
            self.total_epochs,
            learning_rate
        );
    }

    /// Log end of an epoch with the F1 metrics that drive checkpointing
    pub fn end_epoch(&self, train_loss: f64, weighted_f1: f64, macro_f1: f64, learning_rate: f64) {
        let epoch_time = self.epoch_start.elapsed();
        let total_time = self.training_start.elapsed();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch + 1);
        let avg_epoch_time = total_time.as_secs_f64() / (self.epoch + 1) as f64;
        let eta_secs = epochs_remaining as f64 * avg_epoch_time;

        tracing::info!(
            "Epoch {}/{} completed in {} | Loss: {:.4} | Weighted F1: {:.4} | Macro F1: {:.4} | LR: {:.6} | ETA: {}",
            self.epoch + 1,
            self.total_epochs,
            format_duration(epoch_time.as_secs_f64()),
            train_loss,
            weighted_f1,
            macro_f1,
            learning_rate,
            format_duration(eta_secs)
        );
    }

    /// Log a new best model
    pub fn log_new_best(&self, previous: Option<f64>, weighted_f1: f64) {
        match previous {
            Some(prev) => tracing::info!(
                "New best model! Weighted F1 improved: {:.4} -> {:.4}",
                prev,
                weighted_f1
            ),
            None => tracing::info!("First checkpoint: weighted F1 {:.4}", weighted_f1),
        }
    }

    /// Log early stopping
    pub fn log_early_stop(&self, patience: usize) {
        tracing::warn!(
            "Early stopping triggered after {} epochs without improvement",
            patience
        );
    }

    /// Log training completion
    pub fn log_complete(&self, epochs_run: usize, best_weighted_f1: f64) {
        tracing::info!(
            "Training complete! {} epochs in {} | Best weighted F1: {:.4}",
            epochs_run,
            format_duration(self.training_start.elapsed().as_secs_f64()),
            best_weighted_f1
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::parse("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_level_display_is_a_valid_filter() {
        for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert!(EnvFilter::try_new(level.to_string()).is_ok());
        }
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert!(!LogConfig::production().ansi_colors);
    }
}

//! Utilities module for logging, metrics, config files and errors
//!
//! This module provides:
//! - Structured logging with tracing
//! - F1-centred metrics (weighted/macro F1, per-class flags, confusion matrix)
//! - TOML/JSON config helpers
//! - Error handling types

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

// Re-export main types for convenience
pub use error::{Result, StyleSyncError};
pub use logging::init_logging;
pub use metrics::{ConfusionMatrix, Metrics};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Horizontal bar used by the dataset statistics printout
pub fn format_bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    "█".repeat(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_format_bar() {
        assert_eq!(format_bar(0.5, 10).chars().count(), 5);
        assert_eq!(format_bar(2.0, 4).chars().count(), 4);
        assert!(format_bar(0.0, 10).is_empty());
    }
}

//! Error Handling Module
//!
//! Defines the error type shared by the skin-tone and size-prediction pipelines.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for StylesSync operations
#[derive(Error, Debug)]
pub enum StyleSyncError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction or parameters
    #[error("Model error: {0}")]
    Model(String),

    /// Error during a training run
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint could not be written or read back
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// A required feature was absent from a prediction request
    #[error("Missing required feature: '{0}'")]
    MissingFeature(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for StyleSyncError {
    fn from(err: serde_json::Error) -> Self {
        StyleSyncError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for StyleSyncError {
    fn from(err: image::ImageError) -> Self {
        StyleSyncError::InvalidInput(format!("image decoding failed: {}", err))
    }
}

impl From<burn::record::RecorderError> for StyleSyncError {
    fn from(err: burn::record::RecorderError) -> Self {
        StyleSyncError::Checkpoint(format!("{:?}", err))
    }
}

/// Convenience Result type for StylesSync operations
pub type Result<T> = std::result::Result<T, StyleSyncError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| StyleSyncError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| StyleSyncError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| StyleSyncError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| StyleSyncError::InvalidInput(f()))
    }
}

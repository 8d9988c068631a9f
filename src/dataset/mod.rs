//! Dataset module for skin-tone image data
//!
//! This module provides functionality for:
//! - Indexing a per-class image directory tree
//! - Class-count diagnostics and imbalance severity
//! - A stratified train/validation split
//! - Train and eval preprocessing pipelines
//! - Burn `Dataset`/`Batcher` integration with placeholder accounting

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod split;

// Re-export main types for convenience
pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{
    PlaceholderCounter, SkinToneBatch, SkinToneBatcher, SkinToneBurnDataset, SkinToneItem,
};
pub use loader::{DatasetStats, ImageSample, ImbalanceSeverity, SkinToneDataset};
pub use split::{SplitConfig, TrainValSplit};

/// Default class names, in label order
pub const SKIN_TONE_CLASSES: [&str; 4] = ["dark", "light", "mid-dark", "mid-light"];

/// Image file extensions picked up by the loader
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Default class names as owned strings
pub fn default_class_names() -> Vec<String> {
    SKIN_TONE_CLASSES.iter().map(|s| s.to_string()).collect()
}

/// Get the default class name for a label index
pub fn class_name(label: usize) -> Option<&'static str> {
    SKIN_TONE_CLASSES.get(label).copied()
}

/// Get the default label index for a class name
pub fn class_index(name: &str) -> Option<usize> {
    SKIN_TONE_CLASSES.iter().position(|&n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_lookup() {
        assert_eq!(class_name(0), Some("dark"));
        assert_eq!(class_name(3), Some("mid-light"));
        assert_eq!(class_name(4), None);
        assert_eq!(class_index("mid-dark"), Some(2));
        assert_eq!(class_index("olive"), None);
    }

    #[test]
    fn test_default_classes_are_sorted() {
        let names = default_class_names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}

//! Skin-Tone Dataset Loader
//!
//! Indexes a directory tree with one subdirectory per class into a
//! deterministic list of (path, label) samples and reports class-count
//! diagnostics, including the imbalance ratio.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::dataset::IMAGE_EXTENSIONS;
use crate::utils::error::{Result, StyleSyncError};
use crate::utils::format_bar;

/// Ratio above which imbalance is considered moderate
pub const MODERATE_IMBALANCE_RATIO: f64 = 1.5;

/// Ratio above which imbalance is considered severe
pub const SEVERE_IMBALANCE_RATIO: f64 = 2.0;

/// A single image sample with its label and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class name (e.g., "mid-dark")
    pub class_name: String,
    /// Unique sample ID
    pub id: usize,
}

/// Skin-tone dataset index (images are decoded lazily, later)
#[derive(Debug)]
pub struct SkinToneDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples in the dataset
    pub samples: Vec<ImageSample>,
    /// Class names in label order
    pub class_names: Vec<String>,
    /// Mapping from class name to label index
    pub class_to_idx: HashMap<String, usize>,
}

impl SkinToneDataset {
    /// Index a dataset directory, discovering classes from its subdirectories
    ///
    /// The directory should be structured as:
    /// ```text
    /// root_dir/
    /// ├── dark/
    /// │   ├── img_001.jpg
    /// │   └── img_002.jpg
    /// ├── light/
    /// │   └── ...
    /// └── ...
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        Self::build(root_dir.as_ref(), None)
    }

    /// Index a dataset directory with a fixed class order
    ///
    /// Classes without a directory get zero samples. Directories that are not
    /// in `class_names` are skipped.
    pub fn with_classes<P: AsRef<Path>>(root_dir: P, class_names: &[String]) -> Result<Self> {
        Self::build(root_dir.as_ref(), Some(class_names))
    }

    fn build(root_dir: &Path, expected: Option<&[String]>) -> Result<Self> {
        let root_dir = root_dir.to_path_buf();
        info!("Indexing skin-tone dataset at {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(StyleSyncError::PathNotFound(root_dir));
        }

        let mut discovered = BTreeSet::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    discovered.insert(name.to_string());
                }
            }
        }

        let class_names: Vec<String> = match expected {
            Some(names) => {
                for name in names.iter().filter(|n| !discovered.contains(*n)) {
                    warn!("Class directory '{}' is missing; it will have no samples", name);
                }
                for extra in discovered.iter().filter(|d| !names.contains(d)) {
                    warn!("Ignoring directory '{}': not a configured class", extra);
                }
                names.to_vec()
            }
            None => discovered.into_iter().collect(),
        };

        if class_names.is_empty() {
            return Err(StyleSyncError::Dataset(format!(
                "No class directories found in {:?}",
                root_dir
            )));
        }

        let class_to_idx: HashMap<String, usize> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root_dir.join(class_name);
            if !class_dir.is_dir() {
                continue;
            }

            let before = samples.len();
            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path().to_path_buf();
                if has_image_extension(&path) {
                    let id = samples.len();
                    samples.push(ImageSample {
                        path,
                        label,
                        class_name: class_name.clone(),
                        id,
                    });
                }
            }

            debug!(
                "Class '{}' (label {}): {} samples",
                class_name,
                label,
                samples.len() - before
            );
        }

        if samples.is_empty() {
            return Err(StyleSyncError::Dataset(format!(
                "No images found under {:?}",
                root_dir
            )));
        }

        info!(
            "Indexed {} samples across {} classes",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            root_dir,
            samples,
            class_names,
            class_to_idx,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Labels of every sample, in sample order
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// (path, label) pairs for the given sample indices
    pub fn pairs(&self, indices: &[usize]) -> Vec<(PathBuf, usize)> {
        indices
            .iter()
            .filter_map(|&i| self.samples.get(i))
            .map(|s| (s.path.clone(), s.label))
            .collect()
    }

    /// Get statistics about the dataset
    pub fn get_stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            class_names: self.class_names.clone(),
            class_counts,
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// How skewed the class distribution is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImbalanceSeverity {
    Balanced,
    Moderate,
    Severe,
}

impl ImbalanceSeverity {
    /// Classify a max/min class-count ratio
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > SEVERE_IMBALANCE_RATIO {
            ImbalanceSeverity::Severe
        } else if ratio > MODERATE_IMBALANCE_RATIO {
            ImbalanceSeverity::Moderate
        } else {
            ImbalanceSeverity::Balanced
        }
    }
}

impl std::fmt::Display for ImbalanceSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImbalanceSeverity::Balanced => write!(f, "BALANCED"),
            ImbalanceSeverity::Moderate => write!(f, "MODERATE imbalance"),
            ImbalanceSeverity::Severe => write!(f, "SEVERE imbalance"),
        }
    }
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    /// Build stats from a label list
    pub fn from_labels(labels: &[usize], class_names: &[String]) -> Self {
        let mut class_counts = vec![0usize; class_names.len()];
        for &label in labels {
            if let Some(count) = class_counts.get_mut(label) {
                *count += 1;
            }
        }
        Self {
            total_samples: labels.len(),
            class_names: class_names.to_vec(),
            class_counts,
        }
    }

    /// Largest class count over smallest non-empty class count
    pub fn imbalance_ratio(&self) -> Option<f64> {
        let non_empty = self.class_counts.iter().copied().filter(|&c| c > 0);
        let max = non_empty.clone().max()?;
        let min = non_empty.min()?;
        Some(max as f64 / min as f64)
    }

    pub fn severity(&self) -> ImbalanceSeverity {
        self.imbalance_ratio()
            .map(ImbalanceSeverity::from_ratio)
            .unwrap_or(ImbalanceSeverity::Balanced)
    }

    /// Share of each class in percent
    pub fn percentages(&self) -> Vec<f64> {
        self.class_counts
            .iter()
            .map(|&c| {
                if self.total_samples > 0 {
                    100.0 * c as f64 / self.total_samples as f64
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Log per-class counts and the imbalance verdict
    pub fn log_summary(&self) {
        for ((name, count), pct) in self
            .class_names
            .iter()
            .zip(&self.class_counts)
            .zip(self.percentages())
        {
            info!("  {:<12} {:>6} samples ({:.1}%)", name, count, pct);
        }

        let ratio = self.imbalance_ratio().unwrap_or(1.0);
        match self.severity() {
            ImbalanceSeverity::Severe => error!(
                "Imbalance ratio {:.2}: SEVERE imbalance, minority classes need weighting",
                ratio
            ),
            ImbalanceSeverity::Moderate => {
                warn!("Imbalance ratio {:.2}: MODERATE imbalance", ratio)
            }
            ImbalanceSeverity::Balanced => info!("Imbalance ratio {:.2}: balanced", ratio),
        }
    }

    /// Print statistics to console
    pub fn print(&self) {
        println!("\nDataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.class_names.len());
        println!("\n  Samples per class:");

        for (idx, (name, &count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let fraction = if self.total_samples > 0 {
                count as f64 / self.total_samples as f64
            } else {
                0.0
            };
            println!(
                "    {:2}. {:12} {:5} {}",
                idx,
                name,
                count,
                format_bar(fraction, 40)
            );
        }

        match self.imbalance_ratio() {
            Some(ratio) => println!("\n  Imbalance ratio: {:.2} ({})", ratio, self.severity()),
            None => println!("\n  Imbalance ratio: n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn write_tree(root: &Path, layout: &[(&str, usize)]) {
        for (class, count) in layout {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                std::fs::write(dir.join(format!("img_{:03}.jpg", i)), b"not really a jpeg").unwrap();
            }
            std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();
        }
    }

    #[test]
    fn test_reference_counts_are_moderate() {
        let stats = DatasetStats {
            total_samples: 498,
            class_names: names(&["dark", "light", "mid-dark", "mid-light"]),
            class_counts: vec![120, 136, 147, 95],
        };

        let ratio = stats.imbalance_ratio().unwrap();
        assert!((ratio - 147.0 / 95.0).abs() < 1e-12);
        assert_eq!(stats.severity(), ImbalanceSeverity::Moderate);
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(ImbalanceSeverity::from_ratio(1.0), ImbalanceSeverity::Balanced);
        assert_eq!(ImbalanceSeverity::from_ratio(1.5), ImbalanceSeverity::Balanced);
        assert_eq!(ImbalanceSeverity::from_ratio(1.51), ImbalanceSeverity::Moderate);
        assert_eq!(ImbalanceSeverity::from_ratio(2.0), ImbalanceSeverity::Moderate);
        assert_eq!(ImbalanceSeverity::from_ratio(2.01), ImbalanceSeverity::Severe);
    }

    #[test]
    fn test_ratio_ignores_empty_classes() {
        let stats = DatasetStats::from_labels(&[0, 0, 1], &names(&["a", "b", "c"]));
        assert_eq!(stats.class_counts, vec![2, 1, 0]);
        assert_eq!(stats.imbalance_ratio(), Some(2.0));
    }

    #[test]
    fn test_index_directory_tree() {
        let dir = TempDir::new().unwrap();
        write_tree(dir.path(), &[("light", 2), ("dark", 3)]);

        let dataset = SkinToneDataset::new(dir.path()).unwrap();
        assert_eq!(dataset.class_names, names(&["dark", "light"]));
        assert_eq!(dataset.len(), 5);
        assert_eq!(dataset.labels(), vec![0, 0, 0, 1, 1]);
        assert!(dataset.samples[0].path.ends_with("dark/img_000.jpg"));
    }

    #[test]
    fn test_fixed_class_order_with_missing_directory() {
        let dir = TempDir::new().unwrap();
        write_tree(dir.path(), &[("dark", 1), ("mid-light", 2), ("unused", 4)]);

        let classes = names(&["dark", "light", "mid-dark", "mid-light"]);
        let dataset = SkinToneDataset::with_classes(dir.path(), &classes).unwrap();

        assert_eq!(dataset.num_classes(), 4);
        assert_eq!(dataset.get_stats().class_counts, vec![1, 0, 0, 2]);
        assert_eq!(dataset.class_to_idx["mid-light"], 3);
    }

    #[test]
    fn test_missing_root_is_error() {
        let result = SkinToneDataset::new("/nonexistent/skin-tones");
        assert!(matches!(result, Err(StyleSyncError::PathNotFound(_))));
    }

    #[test]
    fn test_empty_tree_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("dark")).unwrap();
        assert!(matches!(
            SkinToneDataset::new(dir.path()),
            Err(StyleSyncError::Dataset(_))
        ));
    }
}

//! Burn Dataset Integration for skin-tone images
//!
//! This module implements Burn's Dataset trait and Batcher for lazy image
//! loading and batching during training.
//!
//! - `SkinToneBurnDataset`: decodes on `get`, runs the train or eval pipeline
//! - `SkinToneBatcher`: stacks items and applies ImageNet normalization
//!
//! An image that fails to decode is replaced by an all-black placeholder with
//! the original label. Every substitution is counted in a shared
//! `PlaceholderCounter` so a run can refuse to continue on a broken dataset.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::ImageReader;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::utils::error::{Result, StyleSyncError};

/// ImageNet channel means used for input normalization
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations used for input normalization
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single skin-tone item ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkinToneItem {
    /// Image data as flattened CHW float array [3 * H * W] in [0, 1]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl SkinToneItem {
    /// Decode an image file and run it through `augmenter`
    pub fn from_path(
        path: &Path,
        label: usize,
        augmenter: &Augmenter,
        rng: Option<&mut ChaCha8Rng>,
    ) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| StyleSyncError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| StyleSyncError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| StyleSyncError::ImageLoad(path.to_path_buf(), e.to_string()))?;

        Ok(Self {
            image: augmenter.preprocess(img, rng),
            label,
            path: path.to_string_lossy().to_string(),
        })
    }

    /// All-black stand-in for an unreadable image
    pub fn placeholder(path: &Path, label: usize, image_size: usize) -> Self {
        Self {
            image: vec![0.0; 3 * image_size * image_size],
            label,
            path: path.to_string_lossy().to_string(),
        }
    }
}

/// Shared tally of placeholder substitutions
#[derive(Clone, Debug, Default)]
pub struct PlaceholderCounter {
    substituted: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl PlaceholderCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, substituted: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if substituted {
            self.substituted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn substituted(&self) -> usize {
        self.substituted.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Fraction of loads that produced a placeholder (0 when nothing was loaded)
    pub fn rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.substituted() as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.substituted.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
    }
}

/// Which preprocessing pipeline a dataset applies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pipeline {
    /// Resize plus random augmentation
    Train,
    /// Resize only
    Eval,
}

/// Lazily-decoding Burn dataset over (path, label) pairs
pub struct SkinToneBurnDataset {
    samples: Vec<(PathBuf, usize)>,
    augmenter: Augmenter,
    pipeline: Pipeline,
    seed: u64,
    draws: AtomicU64,
    placeholders: PlaceholderCounter,
}

impl std::fmt::Debug for SkinToneBurnDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkinToneBurnDataset")
            .field("len", &self.samples.len())
            .field("pipeline", &self.pipeline)
            .field("image_size", &self.augmenter.image_size())
            .finish()
    }
}

impl SkinToneBurnDataset {
    /// Training dataset with random augmentation
    pub fn train(
        samples: Vec<(PathBuf, usize)>,
        image_size: usize,
        augmentation: AugmentationConfig,
        seed: u64,
        placeholders: PlaceholderCounter,
    ) -> Self {
        Self {
            samples,
            augmenter: Augmenter::new(augmentation, image_size as u32),
            pipeline: Pipeline::Train,
            seed,
            draws: AtomicU64::new(0),
            placeholders,
        }
    }

    /// Validation/inference dataset, deterministic
    pub fn eval(
        samples: Vec<(PathBuf, usize)>,
        image_size: usize,
        placeholders: PlaceholderCounter,
    ) -> Self {
        Self {
            samples,
            augmenter: Augmenter::no_augmentation(image_size as u32),
            pipeline: Pipeline::Eval,
            seed: 0,
            draws: AtomicU64::new(0),
            placeholders,
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    pub fn image_size(&self) -> usize {
        self.augmenter.image_size() as usize
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|(_, label)| *label).collect()
    }

    pub fn placeholders(&self) -> &PlaceholderCounter {
        &self.placeholders
    }

    fn load(&self, path: &Path, label: usize) -> SkinToneItem {
        let result = match self.pipeline {
            Pipeline::Train => {
                // Each draw gets its own stream so repeated indices see fresh augmentations
                let draw = self.draws.fetch_add(1, Ordering::Relaxed);
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                rng.set_stream(draw);
                SkinToneItem::from_path(path, label, &self.augmenter, Some(&mut rng))
            }
            Pipeline::Eval => SkinToneItem::from_path(path, label, &self.augmenter, None),
        };

        match result {
            Ok(item) => {
                self.placeholders.record(false);
                item
            }
            Err(e) => {
                warn!("Using black placeholder for unreadable image: {}", e);
                self.placeholders.record(true);
                SkinToneItem::placeholder(path, label, self.image_size())
            }
        }
    }
}

impl Dataset<SkinToneItem> for SkinToneBurnDataset {
    fn get(&self, index: usize) -> Option<SkinToneItem> {
        let (path, label) = self.samples.get(index)?;
        Some(self.load(path, *label))
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of skin-tone images for training
#[derive(Clone, Debug)]
pub struct SkinToneBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating normalized skin-tone batches
#[derive(Clone, Debug)]
pub struct SkinToneBatcher {
    image_size: usize,
}

impl SkinToneBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

/// Normalize CHW `[0, 1]` image tensors with the ImageNet statistics
pub fn normalize<B: Backend>(images: Tensor<B, 4>, device: &B::Device) -> Tensor<B, 4> {
    let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
    let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);
    (images - mean) / std
}

impl<B: Backend> Batcher<B, SkinToneItem, SkinToneBatch<B>> for SkinToneBatcher {
    fn batch(&self, items: Vec<SkinToneItem>, device: &B::Device) -> SkinToneBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        SkinToneBatch {
            images: normalize(images, device),
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};

    type TestBackend = NdArray<f32>;

    fn write_image(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        ImageBuffer::from_pixel(12, 10, Rgb(color)).save(&path).unwrap();
        path
    }

    #[test]
    fn test_eval_dataset_loads_items() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_image(dir.path(), "a.png", [255, 0, 0]);
        let b = write_image(dir.path(), "b.png", [0, 0, 255]);

        let counter = PlaceholderCounter::new();
        let ds = SkinToneBurnDataset::eval(vec![(a, 0), (b, 2)], 8, counter.clone());

        assert_eq!(ds.len(), 2);
        let item = ds.get(1).unwrap();
        assert_eq!(item.label, 2);
        assert_eq!(item.image.len(), 3 * 8 * 8);
        assert!((item.image[2 * 64] - 1.0).abs() < 1e-6);
        assert!(ds.get(2).is_none());
        assert_eq!(counter.substituted(), 0);
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn test_unreadable_image_becomes_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.jpg");
        std::fs::write(&bad, b"not an image").unwrap();

        let counter = PlaceholderCounter::new();
        let ds = SkinToneBurnDataset::eval(vec![(bad, 3)], 4, counter.clone());

        let item = ds.get(0).unwrap();
        assert_eq!(item.label, 3);
        assert!(item.image.iter().all(|&v| v == 0.0));
        assert_eq!(counter.substituted(), 1);
        assert!((counter.rate() - 1.0).abs() < 1e-12);

        counter.reset();
        assert_eq!(counter.rate(), 0.0);
    }

    #[test]
    fn test_train_dataset_varies_between_draws() {
        let dir = tempfile::tempdir().unwrap();
        let img = ImageBuffer::from_fn(16, 16, |x, y| Rgb([(x * 15) as u8, (y * 15) as u8, 90u8]));
        let path = dir.path().join("grad.png");
        img.save(&path).unwrap();

        let ds = SkinToneBurnDataset::train(
            vec![(path, 1)],
            16,
            AugmentationConfig::train(),
            42,
            PlaceholderCounter::new(),
        );

        let first = ds.get(0).unwrap();
        let second = ds.get(0).unwrap();
        assert_eq!(first.label, 1);
        assert_ne!(first.image, second.image);
    }

    #[test]
    fn test_batcher_shapes_and_normalization() {
        let device = Default::default();
        let items = vec![
            SkinToneItem { image: vec![0.485; 3 * 4 * 4], label: 0, path: "a".into() },
            SkinToneItem { image: vec![0.0; 3 * 4 * 4], label: 3, path: "b".into() },
        ];

        let batch: SkinToneBatch<TestBackend> = SkinToneBatcher::new(4).batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);

        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![0, 3]);

        let values: Vec<f32> = batch.images.into_data().iter::<f32>().collect();
        assert!(values[0].abs() < 1e-5);
        assert!((values[3 * 16] - (-0.485 / 0.229)).abs() < 1e-4);
    }
}

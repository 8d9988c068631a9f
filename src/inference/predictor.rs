//! Inference Predictor Module
//!
//! Loads the best checkpoint (parameters and class mapping only) and runs a
//! single eval-mode forward pass per image. Preprocessing is the eval
//! pipeline used during validation, followed by the same normalization.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::prelude::*;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::augmentation::Augmenter;
use crate::dataset::burn_dataset::normalize;
use crate::model::cnn::SkinToneClassifier;
use crate::training::checkpoint::Checkpoint;
use crate::utils::error::{Result, ResultExt, StyleSyncError};

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,

    /// Predicted class index
    pub predicted_class: usize,

    /// Predicted class name
    pub class_name: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    /// Build a result from a probability vector
    ///
    /// The arg-max ignores NaN entries; an all-NaN or empty vector yields class 0
    /// with confidence 0.
    pub fn new(
        probabilities: Vec<f32>,
        class_names: &[String],
        inference_time: Duration,
        image_path: Option<PathBuf>,
    ) -> Self {
        let (predicted_class, confidence) = argmax(&probabilities).unwrap_or((0, 0.0));
        let class_name = class_names
            .get(predicted_class)
            .cloned()
            .unwrap_or_else(|| format!("class_{predicted_class}"));

        Self {
            image_path,
            predicted_class,
            class_name,
            confidence,
            probabilities,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        }
    }

    /// Entropy of the prediction (measure of uncertainty)
    pub fn entropy(&self) -> f32 {
        self.probabilities
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum()
    }

    /// Pretty print the prediction result
    pub fn display(&self, class_names: &[String]) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }
        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.class_name, self.predicted_class
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        for (idx, prob) in self.probabilities.iter().enumerate() {
            let name = class_names.get(idx).map(String::as_str).unwrap_or("?");
            output.push_str(&format!("  {:<12} {:>6.2}%\n", name, prob * 100.0));
        }

        output
    }
}

fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
}

/// Skin-tone predictor holding an immutable, loaded model
#[derive(Debug, Clone)]
pub struct SkinTonePredictor<B: Backend> {
    model: SkinToneClassifier<B>,
    class_names: Vec<String>,
    augmenter: Augmenter,
    device: B::Device,
}

impl<B: Backend> SkinTonePredictor<B> {
    pub fn new(model: SkinToneClassifier<B>, class_names: Vec<String>, image_size: usize, device: B::Device) -> Self {
        Self {
            model,
            class_names,
            augmenter: Augmenter::no_augmentation(image_size as u32),
            device,
        }
    }

    /// Load parameters and class mapping from a checkpoint file
    pub fn from_checkpoint(path: &Path, device: B::Device) -> Result<Self> {
        let checkpoint = Checkpoint::load(path)?;
        let model = checkpoint.load_model::<B>(&device)?;
        debug!(
            "Loaded skin-tone model from {:?} (epoch {}, weighted F1 {:.4})",
            path,
            checkpoint.epoch + 1,
            checkpoint.best_weighted_f1
        );
        Ok(Self::new(model, checkpoint.class_names, checkpoint.image_size, device))
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn image_size(&self) -> usize {
        self.augmenter.image_size() as usize
    }

    /// Predict a decoded image
    pub fn predict_image(&self, image: DynamicImage, image_path: Option<PathBuf>) -> Result<PredictionResult> {
        let start = Instant::now();
        let size = self.image_size();

        let data = self.augmenter.preprocess(image, None);
        let input = Tensor::<B, 4>::from_floats(TensorData::new(data, [1, 3, size, size]), &self.device);
        let probabilities: Vec<f32> = self
            .model
            .forward_softmax(normalize(input, &self.device))
            .into_data()
            .iter::<f32>()
            .collect();

        if probabilities.len() != self.class_names.len() {
            return Err(StyleSyncError::Inference(format!(
                "model produced {} scores for {} classes",
                probabilities.len(),
                self.class_names.len()
            )));
        }

        Ok(PredictionResult::new(probabilities, &self.class_names, start.elapsed(), image_path))
    }

    /// Predict an image file
    pub fn predict_path(&self, path: &Path) -> Result<PredictionResult> {
        let image = ImageReader::open(path)
            .map_err(|e| StyleSyncError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| StyleSyncError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| StyleSyncError::ImageLoad(path.to_path_buf(), e.to_string()))?;
        self.predict_image(image, Some(path.to_path_buf()))
    }

    /// Predict raw encoded image bytes (e.g. an upload)
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult> {
        if bytes.is_empty() {
            return Err(StyleSyncError::InvalidInput("empty image payload".to_string()));
        }
        let image = image::load_from_memory(bytes).context("undecodable image payload")?;
        self.predict_image(image, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cnn::SkinToneClassifierConfig;
    use crate::utils::metrics::Metrics;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn names() -> Vec<String> {
        ["dark", "light", "mid-dark", "mid-light"].iter().map(|s| s.to_string()).collect()
    }

    fn predictor() -> SkinTonePredictor<TestBackend> {
        let device = Default::default();
        let config = SkinToneClassifierConfig::new()
            .with_input_size(16)
            .with_base_filters(2)
            .with_hidden_units(4);
        SkinTonePredictor::new(config.init(&device), names(), 16, device)
    }

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(20, 24, Rgb([180u8, 120, 90])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_prediction_result_argmax() {
        let result = PredictionResult::new(vec![0.1, 0.6, 0.2, 0.1], &names(), Duration::from_millis(5), None);
        assert_eq!(result.predicted_class, 1);
        assert_eq!(result.class_name, "light");
        assert!((result.confidence - 0.6).abs() < 1e-6);
        assert!((result.inference_time_ms - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_argmax_skips_nan() {
        let result = PredictionResult::new(vec![f32::NAN, 0.3, 0.7, f32::NAN], &names(), Duration::ZERO, None);
        assert_eq!(result.predicted_class, 2);

        let all_nan = PredictionResult::new(vec![f32::NAN; 4], &names(), Duration::ZERO, None);
        assert_eq!(all_nan.predicted_class, 0);
        assert_eq!(all_nan.confidence, 0.0);
    }

    #[test]
    fn test_entropy() {
        let certain = PredictionResult::new(vec![1.0, 0.0, 0.0, 0.0], &names(), Duration::ZERO, None);
        assert!(certain.entropy().abs() < 1e-6);

        let uniform = PredictionResult::new(vec![0.25; 4], &names(), Duration::ZERO, None);
        assert!((uniform.entropy() - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_predict_bytes() {
        let result = predictor().predict_bytes(&png_bytes()).unwrap();
        assert!(result.predicted_class < 4);
        assert_eq!(result.probabilities.len(), 4);
        let sum: f32 = result.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let p = predictor();
        let a = p.predict_bytes(&png_bytes()).unwrap();
        let b = p.predict_bytes(&png_bytes()).unwrap();
        assert_eq!(a.probabilities, b.probabilities);
    }

    #[test]
    fn test_malformed_bytes_are_invalid_input() {
        let p = predictor();
        assert!(matches!(p.predict_bytes(b"definitely not a png"), Err(StyleSyncError::InvalidInput(_))));
        assert!(matches!(p.predict_bytes(&[]), Err(StyleSyncError::InvalidInput(_))));
    }

    #[test]
    fn test_from_checkpoint_and_predict_path() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let config = SkinToneClassifierConfig::new()
            .with_input_size(16)
            .with_base_filters(2)
            .with_hidden_units(4);
        let model = config.init::<TestBackend>(&device);
        let metrics = Metrics::from_predictions(&[0], &[0], 4);
        let ckpt_path = dir.path().join("best.json");
        Checkpoint::capture(&model, &config, None, 0, 0.5, &[1.0; 4], &names(), &metrics)
            .unwrap()
            .save(&ckpt_path)
            .unwrap();

        let image_path = dir.path().join("face.png");
        std::fs::write(&image_path, png_bytes()).unwrap();

        let predictor = SkinTonePredictor::<TestBackend>::from_checkpoint(&ckpt_path, device).unwrap();
        assert_eq!(predictor.image_size(), 16);
        let result = predictor.predict_path(&image_path).unwrap();
        assert_eq!(result.image_path.as_deref(), Some(image_path.as_path()));

        let missing = predictor.predict_path(&dir.path().join("missing.png"));
        assert!(matches!(missing, Err(StyleSyncError::ImageLoad(_, _))));
    }
}

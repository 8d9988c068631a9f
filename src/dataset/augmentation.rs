//! Data Augmentation Module
//!
//! Two preprocessing pipelines share this module:
//!
//! - **Train**: resize, random rotation, horizontal flip, color jitter
//!   (brightness, contrast, saturation, hue), then a random affine warp
//!   (a second, smaller rotation plus translation and scale)
//! - **Eval**: resize only
//!
//! Both end in CHW floats in `[0, 1]`; mean/std normalization happens in the
//! batcher.

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Configuration for data augmentation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Maximum rotation of the affine warp, drawn independently
    pub affine_degrees: f32,
    /// Maximum translation as a fraction of width/height
    pub translate_fraction: f32,
    /// Scale range for the affine warp
    pub scale_range: (f32, f32),
    /// Brightness factor range (1.0 ± brightness)
    pub brightness: f32,
    /// Contrast factor range (1.0 ± contrast)
    pub contrast: f32,
    /// Saturation factor range (1.0 ± saturation)
    pub saturation: f32,
    /// Hue shift range as a fraction of the color wheel (±hue, at most 0.5)
    pub hue: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self::train()
    }
}

impl AugmentationConfig {
    /// Heavy augmentation for the training partition
    pub fn train() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            rotation_degrees: 20.0,
            affine_degrees: 10.0,
            translate_fraction: 0.1,
            scale_range: (0.9, 1.1),
            brightness: 0.3,
            contrast: 0.3,
            saturation: 0.3,
            hue: 0.15,
        }
    }

    /// Disable all augmentations (for validation/inference)
    pub fn none() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            rotation_degrees: 0.0,
            affine_degrees: 0.0,
            translate_fraction: 0.0,
            scale_range: (1.0, 1.0),
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            hue: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::none()
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    image_size: u32,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig, image_size: u32) -> Self {
        Self { config, image_size }
    }

    /// Augmenter for the eval pipeline
    pub fn no_augmentation(image_size: u32) -> Self {
        Self::new(AugmentationConfig::none(), image_size)
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Apply the configured random transformations
    pub fn augment(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let cfg = &self.config;
        let mut result = img;

        let angle = sample_symmetric(rng, cfg.rotation_degrees);
        result = self.warp(&result, angle, 0.0, 0.0, 1.0);

        if rng.gen::<f32>() < cfg.horizontal_flip_prob {
            result = result.fliph();
        }

        if cfg.brightness > 0.0 {
            let factor = 1.0 + sample_symmetric(rng, cfg.brightness);
            result = adjust_brightness(&result, factor);
        }
        if cfg.contrast > 0.0 {
            let factor = 1.0 + sample_symmetric(rng, cfg.contrast);
            result = adjust_contrast(&result, factor);
        }
        if cfg.saturation > 0.0 {
            let factor = 1.0 + sample_symmetric(rng, cfg.saturation);
            result = adjust_saturation(&result, factor);
        }
        if cfg.hue > 0.0 {
            let shift = sample_symmetric(rng, cfg.hue.min(0.5));
            result = shift_hue(&result, shift);
        }

        let angle = sample_symmetric(rng, cfg.affine_degrees);
        let (width, height) = result.dimensions();
        let tx = sample_symmetric(rng, cfg.translate_fraction) * width as f32;
        let ty = sample_symmetric(rng, cfg.translate_fraction) * height as f32;
        let (lo, hi) = cfg.scale_range;
        let scale = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        self.warp(&result, angle, tx, ty, scale)
    }

    /// Rotate, scale and translate around the image center
    fn warp(&self, img: &DynamicImage, angle_degrees: f32, tx: f32, ty: f32, scale: f32) -> DynamicImage {
        if angle_degrees.abs() < 0.1 && tx.abs() < 0.5 && ty.abs() < 0.5 && (scale - 1.0).abs() < 1e-3 {
            return img.clone();
        }

        let angle_rad = angle_degrees.to_radians();
        let (width, height) = img.dimensions();
        let rgb = img.to_rgb8();

        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let cos_a = angle_rad.cos();
        let sin_a = angle_rad.sin();

        let mut output = ImageBuffer::new(width, height);

        for y in 0..height {
            for x in 0..width {
                // Inverse mapping: undo translation, rotation and scale
                let dx = (x as f32 - cx - tx) / scale;
                let dy = (y as f32 - cy - ty) / scale;

                let src_x = cx + dx * cos_a + dy * sin_a;
                let src_y = cy - dx * sin_a + dy * cos_a;

                output.put_pixel(x, y, bilinear_sample(&rgb, src_x, src_y));
            }
        }

        DynamicImage::ImageRgb8(output)
    }

    /// Resize image to target size (always applied, not random)
    pub fn resize(&self, img: DynamicImage) -> DynamicImage {
        img.resize_exact(self.image_size, self.image_size, FilterType::Triangle)
    }

    /// Convert image to CHW float tensor data normalized to [0, 1]
    pub fn to_tensor_data(&self, img: &DynamicImage) -> Vec<f32> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let plane = (width * height) as usize;
        let mut data = vec![0.0f32; 3 * plane];

        for (i, pixel) in rgb.pixels().enumerate() {
            data[i] = pixel[0] as f32 / 255.0;
            data[plane + i] = pixel[1] as f32 / 255.0;
            data[2 * plane + i] = pixel[2] as f32 / 255.0;
        }

        data
    }

    /// Full pipeline: resize, augment when an RNG is given, convert to CHW
    pub fn preprocess(&self, img: DynamicImage, rng: Option<&mut ChaCha8Rng>) -> Vec<f32> {
        let mut result = self.resize(img);

        if let Some(rng) = rng {
            if !self.config.is_identity() {
                result = self.augment(result, rng);
            }
        }

        self.to_tensor_data(&result)
    }
}

fn sample_symmetric(rng: &mut ChaCha8Rng, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}

/// Sample a pixel using bilinear interpolation, black outside the image
fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x > width as f32 - 1.0 || y > height as f32 - 1.0 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

fn map_pixels(img: &DynamicImage, f: impl Fn([f32; 3]) -> [f32; 3]) -> DynamicImage {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let out = f([pixel[0] as f32, pixel[1] as f32, pixel[2] as f32]);
        output.put_pixel(
            x,
            y,
            Rgb([
                out[0].round().clamp(0.0, 255.0) as u8,
                out[1].round().clamp(0.0, 255.0) as u8,
                out[2].round().clamp(0.0, 255.0) as u8,
            ]),
        );
    }

    DynamicImage::ImageRgb8(output)
}

fn luminance(p: [f32; 3]) -> f32 {
    0.299 * p[0] + 0.587 * p[1] + 0.114 * p[2]
}

/// Scale all channels by `factor`
fn adjust_brightness(img: &DynamicImage, factor: f32) -> DynamicImage {
    map_pixels(img, |p| [p[0] * factor, p[1] * factor, p[2] * factor])
}

/// Blend with the mean luminance
fn adjust_contrast(img: &DynamicImage, factor: f32) -> DynamicImage {
    let rgb = img.to_rgb8();
    let count = (rgb.width() * rgb.height()).max(1) as f64;
    let sum: f64 = rgb
        .pixels()
        .map(|p| luminance([p[0] as f32, p[1] as f32, p[2] as f32]) as f64)
        .sum();
    let mean = (sum / count) as f32;

    map_pixels(img, |p| {
        [
            mean + factor * (p[0] - mean),
            mean + factor * (p[1] - mean),
            mean + factor * (p[2] - mean),
        ]
    })
}

/// Blend each pixel with its own grayscale value
fn adjust_saturation(img: &DynamicImage, factor: f32) -> DynamicImage {
    map_pixels(img, |p| {
        let gray = luminance(p);
        [
            gray + factor * (p[0] - gray),
            gray + factor * (p[1] - gray),
            gray + factor * (p[2] - gray),
        ]
    })
}

/// Rotate hue by `shift` turns of the color wheel
fn shift_hue(img: &DynamicImage, shift: f32) -> DynamicImage {
    map_pixels(img, |p| {
        let (h, s, v) = rgb_to_hsv(p[0] / 255.0, p[1] / 255.0, p[2] / 255.0);
        let (r, g, b) = hsv_to_rgb((h + shift).rem_euclid(1.0), s, v);
        [r * 255.0, g * 255.0, b * 255.0]
    })
}

fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max <= f32::EPSILON { 0.0 } else { delta / max };

    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h6 = h * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match (sector as i32).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image() -> DynamicImage {
        let img = ImageBuffer::from_fn(40, 30, |x, y| {
            Rgb([(x * 6) as u8, (y * 8) as u8, ((x + y) * 3) as u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_eval_pipeline_is_deterministic_resize() {
        let aug = Augmenter::no_augmentation(16);
        let data = aug.preprocess(create_test_image(), None);

        assert_eq!(data.len(), 3 * 16 * 16);
        assert!(data.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(data, aug.preprocess(create_test_image(), None));
    }

    #[test]
    fn test_train_pipeline_shape_and_range() {
        let aug = Augmenter::new(AugmentationConfig::train(), 24);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let data = aug.preprocess(create_test_image(), Some(&mut rng));
        assert_eq!(data.len(), 3 * 24 * 24);
        assert!(data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_same_seed_same_augmentation() {
        let aug = Augmenter::new(AugmentationConfig::train(), 16);
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(
            aug.preprocess(create_test_image(), Some(&mut a)),
            aug.preprocess(create_test_image(), Some(&mut b))
        );
    }

    #[test]
    fn test_none_config_ignores_rng() {
        let aug = Augmenter::no_augmentation(16);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(
            aug.preprocess(create_test_image(), Some(&mut rng)),
            aug.preprocess(create_test_image(), None)
        );
    }

    #[test]
    fn test_affine_translation_moves_content() {
        let config = AugmentationConfig {
            translate_fraction: 0.5,
            ..AugmentationConfig::none()
        };
        let aug = Augmenter::new(config, 32);
        let flat = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(32, 32, Rgb([200u8, 150, 120])));

        let saw_border = (0..8).any(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let out = aug.augment(flat.clone(), &mut rng).to_rgb8();
            out.pixels().any(|p| p.0 == [0, 0, 0])
        });
        assert!(saw_border);
    }

    #[test]
    fn test_affine_rotation_is_independent() {
        let rotation_only = AugmentationConfig {
            rotation_degrees: 20.0,
            ..AugmentationConfig::none()
        };
        let both = AugmentationConfig {
            affine_degrees: 10.0,
            ..rotation_only.clone()
        };
        let img = create_test_image();

        let differs = (0..4).any(|seed| {
            let mut a = ChaCha8Rng::seed_from_u64(seed);
            let mut b = ChaCha8Rng::seed_from_u64(seed);
            let once = Augmenter::new(rotation_only.clone(), 40).augment(img.clone(), &mut a);
            let twice = Augmenter::new(both.clone(), 40).augment(img.clone(), &mut b);
            once.to_rgb8().into_raw() != twice.to_rgb8().into_raw()
        });
        assert!(differs);
    }

    #[test]
    fn test_to_tensor_data_is_chw() {
        let aug = Augmenter::no_augmentation(2);
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(2, 2, Rgb([255u8, 0, 51])));
        let data = aug.to_tensor_data(&img);

        assert_eq!(&data[0..4], &[1.0; 4]);
        assert_eq!(&data[4..8], &[0.0; 4]);
        assert!((data[8] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_hsv_round_trip() {
        for &(r, g, b) in &[(0.9f32, 0.2, 0.1), (0.1, 0.8, 0.3), (0.2, 0.3, 0.7), (0.5, 0.5, 0.5)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            let (r2, g2, b2) = hsv_to_rgb(h, s, v);
            assert!((r - r2).abs() < 1e-5 && (g - g2).abs() < 1e-5 && (b - b2).abs() < 1e-5);
        }
    }

    #[test]
    fn test_brightness_scales_pixels() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(2, 2, Rgb([100u8, 50, 200])));
        let brighter = adjust_brightness(&img, 1.2).to_rgb8();
        assert_eq!(brighter.get_pixel(0, 0), &Rgb([120, 60, 240]));
    }
}

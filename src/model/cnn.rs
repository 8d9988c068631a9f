//! CNN Model Architecture for Skin-Tone Classification
//!
//! Three convolutional stages (conv → ReLU → 2×2 max-pool) doubling the
//! channel depth 32 → 64 → 128, followed by flattening and a two-layer
//! fully-connected head. There is no stochastic layer, so eval-mode output is
//! deterministic for fixed weights.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the SkinToneClassifier CNN model
#[derive(Config, Debug)]
pub struct SkinToneClassifierConfig {
    /// Number of output classes
    #[config(default = "4")]
    pub num_classes: usize,

    /// Input image size (square, divisible by 8)
    #[config(default = "128")]
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the first stage; later stages double it
    #[config(default = "32")]
    pub base_filters: usize,

    /// Width of the hidden fully-connected layer
    #[config(default = "128")]
    pub hidden_units: usize,
}

impl SkinToneClassifierConfig {
    /// Spatial size after the three pooling stages
    pub fn feature_map_size(&self) -> usize {
        self.input_size / 8
    }

    /// Length of the flattened feature vector fed to the head
    pub fn flattened_features(&self) -> usize {
        let side = self.feature_map_size();
        self.base_filters * 4 * side * side
    }

    /// Build the model on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> SkinToneClassifier<B> {
        SkinToneClassifier::new(self, device)
    }
}

/// Conv → ReLU → 2×2 max-pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Skin-tone classifier CNN
#[derive(Module, Debug)]
pub struct SkinToneClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,

    pub fc1: Linear<B>,
    pub relu: Relu,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> SkinToneClassifier<B> {
    /// Create a new SkinToneClassifier from configuration
    pub fn new(config: &SkinToneClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        // 128 -> 64 -> 32 -> 16 at the default input size
        let conv1 = ConvBlock::new(config.in_channels, base, device);
        let conv2 = ConvBlock::new(base, base * 2, device);
        let conv3 = ConvBlock::new(base * 2, base * 4, device);

        let fc1 = LinearConfig::new(config.flattened_features(), config.hidden_units).init(device);
        let fc2 = LinearConfig::new(config.hidden_units, config.num_classes).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            fc1,
            relu: Relu::new(),
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Normalized input of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        // Flatten: [B, C, H, W] -> [B, C*H*W]
        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.fc1.forward(x);
        let x = self.relu.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn small_config() -> SkinToneClassifierConfig {
        SkinToneClassifierConfig::new()
            .with_input_size(16)
            .with_base_filters(4)
            .with_hidden_units(8)
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model: SkinToneClassifier<TestBackend> = small_config().init(&device);

        let input = Tensor::<TestBackend, 4>::random([2, 3, 16, 16], Distribution::Default, &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 4]);
        assert_eq!(model.num_classes(), 4);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model: SkinToneClassifier<TestBackend> = small_config().init(&device);

        let input = Tensor::<TestBackend, 4>::random([3, 3, 16, 16], Distribution::Default, &device);
        let probs = model.forward_softmax(input);
        let sums: Vec<f32> = probs.sum_dim(1).into_data().iter::<f32>().collect();

        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_forward_is_deterministic() {
        let device = Default::default();
        let model: SkinToneClassifier<TestBackend> = small_config().init(&device);
        let input = Tensor::<TestBackend, 4>::random([1, 3, 16, 16], Distribution::Default, &device);

        let a: Vec<f32> = model.forward(input.clone()).into_data().iter::<f32>().collect();
        let b: Vec<f32> = model.forward(input).into_data().iter::<f32>().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_default_geometry() {
        let config = SkinToneClassifierConfig::new();
        assert_eq!(config.feature_map_size(), 16);
        assert_eq!(config.flattened_features(), 128 * 16 * 16);
    }
}

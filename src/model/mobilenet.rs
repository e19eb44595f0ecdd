//! MobileNetV2 Classifier
//!
//! A stem convolution, seventeen linear bottlenecks and a 1x1-convolution
//! classification head, all scaled by a single width multiplier.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::Conv2d,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, Dropout, DropoutConfig,
    },
    tensor::{activation, backend::Backend, Tensor},
};

use super::bottleneck::{BlockSpec, LinearBottleneck};
use super::layers::{batch_norm, conv, pointwise_conv, relu6};
use super::{final_channels, scale_channels};
use crate::utils::error::{ClassifierError, Result as ClassifierResult};

/// Width of the stem convolution before scaling
pub const STEM_CHANNELS: usize = 32;

/// Bottleneck sequence of the full-width network.
///
/// The second entry declares 32 input channels although the first block
/// emits 16: its expansion widens from the declared count.
pub const BOTTLENECKS: [BlockSpec; 17] = [
    // 16 outputs, stride 1
    BlockSpec::new(32, 16, 1, 1),
    // 24 outputs, first stride 2
    BlockSpec::new(32, 24, 2, 6),
    BlockSpec::new(24, 24, 1, 6),
    // 32 outputs, first stride 2
    BlockSpec::new(24, 32, 2, 6),
    BlockSpec::new(32, 32, 1, 6),
    BlockSpec::new(32, 32, 1, 6),
    // 64 outputs, first stride 2
    BlockSpec::new(32, 64, 2, 6),
    BlockSpec::new(64, 64, 1, 6),
    BlockSpec::new(64, 64, 1, 6),
    BlockSpec::new(64, 64, 1, 6),
    // 96 outputs, stride 1
    BlockSpec::new(64, 96, 1, 6),
    BlockSpec::new(96, 96, 1, 6),
    BlockSpec::new(96, 96, 1, 6),
    // 160 outputs, first stride 2
    BlockSpec::new(96, 160, 2, 6),
    BlockSpec::new(160, 160, 1, 6),
    BlockSpec::new(160, 160, 1, 6),
    // 320 outputs, stride 1
    BlockSpec::new(160, 320, 1, 6),
];

/// Configuration for the MobileNetV2 classifier
#[derive(Config, Debug)]
pub struct MobileNetV2Config {
    /// Number of output classes
    #[config(default = "2")]
    pub num_classes: usize,

    /// Width multiplier applied to every layer
    #[config(default = "1.0")]
    pub multiplier: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Dropout before the classification head
    #[config(default = "0.3")]
    pub dropout: f64,

    /// Input image size (square)
    #[config(default = "224")]
    pub input_size: usize,
}

impl MobileNetV2Config {
    /// Width of the stem convolution
    pub fn stem_channels(&self) -> usize {
        scale_channels(STEM_CHANNELS, self.multiplier)
    }

    /// Bottleneck specs with the width multiplier applied
    pub fn block_plan(&self) -> Vec<BlockSpec> {
        BOTTLENECKS
            .iter()
            .map(|spec| spec.scaled(self.multiplier))
            .collect()
    }

    /// Width of the last feature map, before the classifier
    pub fn head_channels(&self) -> usize {
        final_channels(self.multiplier)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ClassifierResult<()> {
        if self.num_classes == 0 {
            return Err(ClassifierError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }

        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(ClassifierError::Config(format!(
                "multiplier must be a positive number, got {}",
                self.multiplier
            )));
        }

        if self.in_channels == 0 {
            return Err(ClassifierError::Config(
                "in_channels must be greater than 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ClassifierError::Config(format!(
                "dropout must be in range [0.0, 1.0), got {}",
                self.dropout
            )));
        }

        if self.input_size < 32 {
            return Err(ClassifierError::Config(format!(
                "input_size must be at least 32, got {}",
                self.input_size
            )));
        }

        let too_narrow = self.stem_channels() == 0
            || self
                .block_plan()
                .iter()
                .any(|spec| spec.in_channels == 0 || spec.out_channels == 0);
        if too_narrow {
            return Err(ClassifierError::Config(format!(
                "multiplier {} scales some layer to zero channels",
                self.multiplier
            )));
        }

        Ok(())
    }

    /// Validate the configuration and build the network
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierResult<MobileNetV2<B>> {
        self.validate()?;
        Ok(MobileNetV2::new(self, device))
    }
}

/// MobileNetV2 image classifier
///
/// Architecture:
/// - 3x3 stride-2 stem convolution, BatchNorm, ReLU
/// - 17 linear bottlenecks (see [`BOTTLENECKS`])
/// - 1x1 convolution to at least 1280 channels, BatchNorm, ReLU6, Dropout
/// - Global average pooling and a bias-free 1x1 convolution per class
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    pub stem: Conv2d<B>,
    pub stem_bn: BatchNorm<B>,

    pub blocks: Vec<LinearBottleneck<B>>,

    pub head_conv: Conv2d<B>,
    pub head_bn: BatchNorm<B>,
    pub dropout: Dropout,
    pub pool: AdaptiveAvgPool2d,
    pub classifier: Conv2d<B>,

    num_classes: usize,
    multiplier: f64,
}

impl<B: Backend> MobileNetV2<B> {
    /// Build the network. Prefer [`MobileNetV2Config::init`], which validates first.
    pub fn new(config: &MobileNetV2Config, device: &B::Device) -> Self {
        let stem_channels = config.stem_channels();
        let stem = conv(config.in_channels, stem_channels, 3, 2, device);
        let stem_bn = batch_norm(stem_channels, device);

        let mut channels = stem_channels;
        let mut blocks = Vec::with_capacity(BOTTLENECKS.len());
        for spec in config.block_plan() {
            blocks.push(LinearBottleneck::new(channels, &spec, device));
            channels = spec.out_channels;
        }

        let head_channels = config.head_channels();
        let head_conv = pointwise_conv(channels, head_channels, device);
        let head_bn = batch_norm(head_channels, device);

        // At 224x224 the feature map is 7x7, so this is the 7x7 average pool
        let pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let classifier = pointwise_conv(head_channels, config.num_classes, device);

        Self {
            stem,
            stem_bn,
            blocks,
            head_conv,
            head_bn,
            dropout: DropoutConfig::new(config.dropout).init(),
            pool,
            classifier,
            num_classes: config.num_classes,
            multiplier: config.multiplier,
        }
    }

    /// Feature extraction up to (and including) the last bottleneck
    pub fn forward_features(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.stem.forward(images);
        let x = self.stem_bn.forward(x);
        let x = activation::relu(x);

        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `images` - Input tensor of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.forward_features(images);

        let x = relu6(self.head_bn.forward(self.head_conv.forward(x)));
        let x = self.dropout.forward(x);

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, num_classes, 1, 1]
        let x = self.pool.forward(x);
        let x = self.classifier.forward(x);

        let [batch_size, classes, _, _] = x.dims();
        x.reshape([batch_size, classes])
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        activation::softmax(self.forward(images), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> MobileNetV2Config {
        MobileNetV2Config::new()
            .with_multiplier(0.5)
            .with_input_size(32)
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = small_config().with_num_classes(5);

        let json = serde_json::to_string(&config).unwrap();
        let parsed: MobileNetV2Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.num_classes, 5);
        assert_eq!(parsed.multiplier, 0.5);
        assert_eq!(parsed.input_size, 32);

        let model = parsed.init::<TestBackend>(&Default::default()).unwrap();
        assert_eq!(model.num_classes(), 5);
    }

    #[test]
    fn test_default_config() {
        let config = MobileNetV2Config::new();
        assert_eq!(config.num_classes, 2);
        assert_eq!(config.multiplier, 1.0);
        assert_eq!(config.input_size, 224);
        assert_eq!(config.stem_channels(), 32);
        assert_eq!(config.head_channels(), 1280);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_block_plan_matches_table() {
        let plan = MobileNetV2Config::new().block_plan();
        assert_eq!(plan.len(), 17);
        assert_eq!(plan, BOTTLENECKS.to_vec());

        let strides: Vec<usize> = plan.iter().map(|s| s.stride).collect();
        assert_eq!(strides, vec![1, 2, 1, 2, 1, 1, 2, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1]);

        let residuals = plan.iter().filter(|s| s.has_residual()).count();
        assert_eq!(residuals, 10);
    }

    #[test]
    fn test_wide_multiplier_widens_head() {
        let config = MobileNetV2Config::new().with_multiplier(1.5);
        assert_eq!(config.stem_channels(), 48);
        assert_eq!(config.head_channels(), 1920);

        let narrow = MobileNetV2Config::new().with_multiplier(0.5);
        assert_eq!(narrow.head_channels(), 1280);
    }

    #[test]
    fn test_config_validation() {
        assert!(MobileNetV2Config::new().with_num_classes(0).validate().is_err());
        assert!(MobileNetV2Config::new().with_multiplier(0.0).validate().is_err());
        assert!(MobileNetV2Config::new().with_multiplier(f64::NAN).validate().is_err());
        assert!(MobileNetV2Config::new().with_dropout(1.0).validate().is_err());
        assert!(MobileNetV2Config::new().with_input_size(16).validate().is_err());

        // int(16 * 0.05) == 0
        let err = MobileNetV2Config::new()
            .with_multiplier(0.05)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("zero channels"));
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 2]);
        assert_eq!(model.blocks.len(), 17);
        assert_eq!(model.num_classes(), 2);
    }

    #[test]
    fn test_feature_map_is_downsampled_32x() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let features = model.forward_features(Tensor::zeros([1, 3, 64, 64], &device));
        assert_eq!(features.dims(), [1, 160, 2, 2]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = small_config()
            .with_num_classes(3)
            .init::<TestBackend>(&device)
            .unwrap();

        let probs = model.forward_softmax(Tensor::ones([2, 3, 32, 32], &device));
        assert_eq!(probs.dims(), [2, 3]);

        let sums: Vec<f32> = probs.sum_dim(1).into_data().to_vec().unwrap();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_classifier_has_no_bias() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        assert!(model.classifier.bias.is_none());
        assert!(model.stem.bias.is_none());
        assert_eq!(model.classifier.num_params(), 1280 * 2);
    }
}

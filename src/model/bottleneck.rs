//! Inverted residual / linear bottleneck unit
//!
//! The unit widens its input with a pointwise convolution, filters every
//! channel with a 3x3 depthwise convolution and projects back down to a
//! narrow output. The projection has no activation (the "linear"
//! bottleneck), and when the unit keeps both resolution and width its input
//! is added to its output.

use burn::{
    module::Module,
    nn::{conv::Conv2d, BatchNorm},
    tensor::{backend::Backend, Tensor},
};

use super::layers::{batch_norm, depthwise_conv, pointwise_conv, relu6};

/// Shape of one bottleneck, in channels of the full-width (multiplier 1.0) network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    /// Declared input width; sets the expansion width and the residual test
    pub in_channels: usize,
    /// Output width
    pub out_channels: usize,
    /// Stride of the depthwise convolution
    pub stride: usize,
    /// Expansion factor applied to `in_channels`
    pub expansion: usize,
}

impl BlockSpec {
    pub const fn new(in_channels: usize, out_channels: usize, stride: usize, expansion: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            stride,
            expansion,
        }
    }

    /// Width of the depthwise stage
    pub fn expanded_channels(&self) -> usize {
        self.in_channels * self.expansion
    }

    /// Whether the block input is added back to its output
    pub fn has_residual(&self) -> bool {
        self.stride == 1 && self.in_channels == self.out_channels
    }

    /// Apply a width multiplier to both channel counts
    pub fn scaled(&self, multiplier: f64) -> Self {
        Self {
            in_channels: super::scale_channels(self.in_channels, multiplier),
            out_channels: super::scale_channels(self.out_channels, multiplier),
            ..*self
        }
    }
}

/// Expand -> depthwise -> project, with an optional residual connection
#[derive(Module, Debug)]
pub struct LinearBottleneck<B: Backend> {
    pub expand: Conv2d<B>,
    pub expand_bn: BatchNorm<B>,
    pub depthwise: Conv2d<B>,
    pub depthwise_bn: BatchNorm<B>,
    pub project: Conv2d<B>,
    pub project_bn: BatchNorm<B>,
    residual: bool,
}

impl<B: Backend> LinearBottleneck<B> {
    /// Build a bottleneck fed by a tensor with `input_channels` channels.
    ///
    /// `input_channels` is the width the previous layer actually produces;
    /// it can differ from `spec.in_channels`, which only decides the
    /// expansion width and whether the residual add applies.
    pub fn new(input_channels: usize, spec: &BlockSpec, device: &B::Device) -> Self {
        let expanded = spec.expanded_channels();

        Self {
            expand: pointwise_conv(input_channels, expanded, device),
            expand_bn: batch_norm(expanded, device),
            depthwise: depthwise_conv(expanded, spec.stride, device),
            depthwise_bn: batch_norm(expanded, device),
            project: pointwise_conv(expanded, spec.out_channels, device),
            project_bn: batch_norm(spec.out_channels, device),
            residual: spec.has_residual() && input_channels == spec.out_channels,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu6(self.expand_bn.forward(self.expand.forward(input.clone())));
        let x = relu6(self.depthwise_bn.forward(self.depthwise.forward(x)));
        let x = self.project_bn.forward(self.project.forward(x));

        if self.residual {
            x + input
        } else {
            x
        }
    }

    pub fn has_residual(&self) -> bool {
        self.residual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, ElementConversion};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_spec_residual_rule() {
        assert!(BlockSpec::new(24, 24, 1, 6).has_residual());
        assert!(!BlockSpec::new(24, 24, 2, 6).has_residual());
        assert!(!BlockSpec::new(64, 96, 1, 6).has_residual());
    }

    #[test]
    fn test_spec_scaling_truncates() {
        let spec = BlockSpec::new(32, 16, 1, 1).scaled(0.75);
        assert_eq!(spec.in_channels, 24);
        assert_eq!(spec.out_channels, 12);

        let spec = BlockSpec::new(24, 32, 2, 6).scaled(0.35);
        assert_eq!(spec.in_channels, 8); // 8.4
        assert_eq!(spec.out_channels, 11); // 11.2
        assert_eq!(spec.stride, 2);
        assert_eq!(spec.expansion, 6);
    }

    #[test]
    fn test_bottleneck_param_count() {
        let device = Default::default();
        let block = LinearBottleneck::<TestBackend>::new(24, &BlockSpec::new(24, 24, 1, 6), &device);

        // Batch norms count gamma, beta and both running statistics
        // expand 24*144 + bn 4*144 + depthwise 144*9 + bn 4*144 + project 144*24 + bn 4*24
        assert_eq!(block.num_params(), 3456 + 576 + 1296 + 576 + 3456 + 96);
        assert!(block.has_residual());
    }

    #[test]
    fn test_bottleneck_strided_output_shape() {
        let device = Default::default();
        let block = LinearBottleneck::<TestBackend>::new(8, &BlockSpec::new(8, 12, 2, 6), &device);

        let out = block.forward(Tensor::zeros([2, 8, 16, 16], &device));
        assert_eq!(out.dims(), [2, 12, 8, 8]);
        assert!(!block.has_residual());
    }

    #[test]
    fn test_declared_width_differs_from_actual_input() {
        let device = Default::default();
        // Fed 16 channels, but expands from the declared 32
        let block = LinearBottleneck::<TestBackend>::new(16, &BlockSpec::new(32, 24, 2, 6), &device);

        assert_eq!(block.expand.weight.val().dims(), [192, 16, 1, 1]);
        let out = block.forward(Tensor::zeros([1, 16, 8, 8], &device));
        assert_eq!(out.dims(), [1, 24, 4, 4]);
    }

    #[test]
    fn test_residual_adds_input() {
        let device = Default::default();
        let block = LinearBottleneck::<TestBackend>::new(4, &BlockSpec::new(4, 4, 1, 2), &device);
        let plain = LinearBottleneck {
            residual: false,
            ..block.clone()
        };

        let input = Tensor::<TestBackend, 4>::random(
            [1, 4, 5, 5],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let shortcut = block.forward(input.clone()) - plain.forward(input.clone());

        let diff: f32 = (shortcut - input).abs().max().into_scalar().elem();
        assert!(diff < 1e-5);
    }
}

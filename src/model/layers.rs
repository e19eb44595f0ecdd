//! Layer constructors shared by the stem, the bottlenecks and the head.
//!
//! Every convolution in the network is bias-free and Glorot-uniform
//! initialized; every batch norm uses epsilon 1e-3 and keeps running
//! statistics with a 0.99 moving-average decay.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d,
    },
    tensor::{backend::Backend, Tensor},
};

/// Batch norm epsilon
pub const BN_EPSILON: f64 = 1e-3;

/// Burn's momentum is the weight of the new batch statistic, i.e. `1 - decay`.
pub const BN_MOMENTUM: f64 = 0.01;

/// Upper bound of the ReLU6 activation
pub const RELU6_CAP: f64 = 6.0;

fn glorot_uniform() -> Initializer {
    Initializer::XavierUniform { gain: 1.0 }
}

/// Symmetric padding that keeps `ceil(size / stride)` outputs for odd kernels
pub fn same_padding(kernel_size: usize) -> PaddingConfig2d {
    let pad = kernel_size / 2;
    PaddingConfig2d::Explicit(pad, pad)
}

/// Output length of a convolution along one spatial axis
pub fn conv_output_size(size: usize, kernel_size: usize, stride: usize, padding: usize) -> usize {
    (size + 2 * padding).saturating_sub(kernel_size) / stride + 1
}

/// Dense `k x k` convolution
pub fn conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(same_padding(kernel_size))
        .with_bias(false)
        .with_initializer(glorot_uniform())
        .init(device)
}

/// `1 x 1` convolution
pub fn pointwise_conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    device: &B::Device,
) -> Conv2d<B> {
    conv(in_channels, out_channels, 1, 1, device)
}

/// Depthwise `3 x 3` convolution: one filter per channel
pub fn depthwise_conv<B: Backend>(channels: usize, stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([channels, channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(same_padding(3))
        .with_groups(channels)
        .with_bias(false)
        .with_initializer(glorot_uniform())
        .init(device)
}

pub fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B> {
    BatchNormConfig::new(channels)
        .with_epsilon(BN_EPSILON)
        .with_momentum(BN_MOMENTUM)
        .init(device)
}

/// Standard ReLU with the maximum thresholded to 6
pub fn relu6<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clamp(0.0, RELU6_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_relu6_clamps_both_ends() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-3.0, 0.5, 6.0, 9.5], &device);

        let values: Vec<f32> = relu6(x).into_data().to_vec().unwrap();
        assert_eq!(values, vec![0.0, 0.5, 6.0, 6.0]);
    }

    #[test]
    fn test_conv_output_size() {
        // 3x3 stride 2 with padding 1 halves even inputs
        assert_eq!(conv_output_size(224, 3, 2, 1), 112);
        assert_eq!(conv_output_size(7, 3, 2, 1), 4);
        // 3x3 stride 1 with padding 1 keeps the size
        assert_eq!(conv_output_size(56, 3, 1, 1), 56);
        assert_eq!(conv_output_size(14, 1, 1, 0), 14);
    }

    #[test]
    fn test_depthwise_conv_keeps_channels_and_halves_space() {
        let device = Default::default();
        let dw = depthwise_conv::<TestBackend>(12, 2, &device);

        let out = dw.forward(Tensor::zeros([1, 12, 16, 16], &device));
        assert_eq!(out.dims(), [1, 12, 8, 8]);
        // One 3x3 filter per channel, no bias
        assert_eq!(burn::module::Module::num_params(&dw), 12 * 9);
    }
}

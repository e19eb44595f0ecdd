//! Model module for the MobileNetV2 architecture using the Burn framework
//!
//! This module provides:
//! - The linear bottleneck (inverted residual) building block
//! - The full MobileNetV2 classifier and its configuration
//! - A layer-by-layer summary with output shapes and parameter counts

pub mod bottleneck;
pub mod layers;
pub mod mobilenet;
pub mod summary;

// Re-export main types for convenience
pub use bottleneck::{BlockSpec, LinearBottleneck};
pub use mobilenet::{MobileNetV2, MobileNetV2Config, BOTTLENECKS};
pub use summary::ModelSummary;

/// Minimum width of the last convolution
pub const MIN_FINAL_CHANNELS: usize = 1280;

/// Scale a channel count by the width multiplier, truncating toward zero
pub fn scale_channels(channels: usize, multiplier: f64) -> usize {
    (channels as f64 * multiplier) as usize
}

/// Width of the last convolution: never below 1280, widened for multipliers above 1.0
pub fn final_channels(multiplier: f64) -> usize {
    if multiplier > 1.0 {
        scale_channels(MIN_FINAL_CHANNELS, multiplier)
    } else {
        MIN_FINAL_CHANNELS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_channels() {
        assert_eq!(scale_channels(32, 1.0), 32);
        assert_eq!(scale_channels(32, 0.5), 16);
        assert_eq!(scale_channels(24, 0.75), 18);
        assert_eq!(scale_channels(16, 0.35), 5);
        assert_eq!(scale_channels(16, 0.05), 0);
    }

    #[test]
    fn test_final_channels() {
        assert_eq!(final_channels(0.5), 1280);
        assert_eq!(final_channels(1.0), 1280);
        assert_eq!(final_channels(2.0), 2560);
    }
}

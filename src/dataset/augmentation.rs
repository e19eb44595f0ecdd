//! Minimal Data Augmentation Module
//!
//! Training images are rescaled to [0, 1] and mirrored left-to-right half of
//! the time. Validation images are only rescaled.

use image::{imageops, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Probability of mirroring a training image
pub const FLIP_PROBABILITY: f64 = 0.5;

/// Pixel scale factor mapping u8 intensities to [0, 1]
pub const RESCALE: f32 = 1.0 / 255.0;

/// Per-image preprocessing applied after decoding and resizing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Augmenter {
    /// Multiplier applied to every pixel value
    pub rescale: f32,
    /// Randomly mirror images horizontally
    pub horizontal_flip: bool,
}

impl Default for Augmenter {
    fn default() -> Self {
        Self::validation()
    }
}

impl Augmenter {
    /// Rescale and random horizontal flip
    pub fn training() -> Self {
        Self {
            rescale: RESCALE,
            horizontal_flip: true,
        }
    }

    /// Rescale only
    pub fn validation() -> Self {
        Self {
            rescale: RESCALE,
            horizontal_flip: false,
        }
    }

    /// Decide whether the next image gets mirrored
    pub fn sample_flip<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.horizontal_flip && rng.random_bool(FLIP_PROBABILITY)
    }

    /// Apply the geometric part of the augmentation
    pub fn transform(&self, img: RgbImage, flip: bool) -> RgbImage {
        if flip {
            imageops::flip_horizontal(&img)
        } else {
            img
        }
    }

    /// Convert to a rescaled CHW float buffer
    pub fn to_chw(&self, img: &RgbImage) -> Vec<f32> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let plane = width * height;
        let mut data = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in img.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for channel in 0..3 {
                data[channel * plane + offset] = pixel[channel] as f32 * self.rescale;
            }
        }

        data
    }
}

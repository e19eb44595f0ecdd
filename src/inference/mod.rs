//! Inference module for trained checkpoints
//!
//! This module provides:
//! - Reloading a saved checkpoint together with its class names
//! - Single image and batch prediction
//! - Whole-directory evaluation into a confusion matrix

pub mod evaluate;
pub mod predictor;

// Re-export main types for convenience
pub use evaluate::evaluate;
pub use predictor::{Prediction, Predictor};

//! # MobileNetV2 Classifier
//!
//! A MobileNetV2 image classifier and its training driver, built on the Burn framework.
//!
//! ## Features
//!
//! - **MobileNetV2** with linear bottlenecks and a width multiplier
//! - **Folder datasets**: one sub-directory per class, shuffled and flipped on the fly
//! - **Step-based training** with a piecewise learning rate and per-iteration time decay
//! - **Best-model checkpoints** on validation accuracy, reloadable for prediction
//!
//! ## Modules
//!
//! - `dataset`: Directory discovery, augmentation and batching
//! - `model`: The network, its building blocks and a layer summary
//! - `training`: Configuration, schedules, checkpointing and the fit loop
//! - `inference`: Prediction and evaluation with saved checkpoints
//! - `utils`: Logging, metrics and errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mobilenetv2_classifier::backend::{default_device, TrainingBackend};
//! use mobilenetv2_classifier::training::{fit, TrainingConfig};
//!
//! let config = TrainingConfig::load("config/train.toml".as_ref())?;
//! let history = fit::<TrainingBackend>(&config, &default_device(), true)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{DirectoryFlow, ImageFolder, ImageFolderDataset};
pub use inference::{Prediction, Predictor};
pub use model::{MobileNetV2, MobileNetV2Config, ModelSummary};
pub use training::{fit, TrainingConfig, TrainingHistory};
pub use utils::error::{ClassifierError, Result};
pub use utils::metrics::ConfusionMatrix;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

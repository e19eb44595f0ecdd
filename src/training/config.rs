//! Training configuration
//!
//! Every field has a default, so a TOML file only needs the values it changes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::checkpoint::CheckpointNamer;
use super::scheduler::{LrSchedule, TimeDecay};
use crate::model::MobileNetV2Config;
use crate::utils::error::{ClassifierError, Result};

/// Configuration for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Directory with one sub-directory of training images per class
    pub train_dir: PathBuf,
    /// Directory with one sub-directory of validation images per class
    pub test_dir: PathBuf,
    /// Where improved weights are written (created on demand)
    pub save_dir: PathBuf,
    /// Checkpoint file name template
    pub model_name: String,

    pub num_classes: usize,
    /// Width multiplier of the network
    pub multiplier: f64,
    /// Images are resized to `image_size x image_size`
    pub image_size: usize,

    pub batch_size: usize,
    pub epochs: usize,

    /// Base learning rate before scheduling
    pub learning_rate: f64,
    /// Per-iteration inverse time decay
    pub decay: f64,
    pub schedule: LrSchedule,

    /// Nominal training set size; steps per epoch = train_samples / batch_size
    pub train_samples: usize,
    /// Nominal validation set size; validation steps = validation_samples / batch_size
    pub validation_samples: usize,

    /// Random seed for shuffling and augmentation
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("Oranges2/train"),
            test_dir: PathBuf::from("Oranges2/test"),
            save_dir: PathBuf::from("oranges_models"),
            model_name: "oranges_weight_model.{epoch:03}-{val_acc}".to_string(),
            num_classes: 2,
            multiplier: 1.0,
            image_size: 224,
            batch_size: 32,
            epochs: 50,
            learning_rate: 0.001,
            decay: 0.0005,
            schedule: LrSchedule::default(),
            train_samples: 600,
            validation_samples: 200,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ClassifierError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            ClassifierError::Config(format!("Failed to parse config {}: {e}", path.display()))
        })
    }

    /// Optimizer steps per epoch
    pub fn steps_per_epoch(&self) -> usize {
        self.train_samples / self.batch_size.max(1)
    }

    /// Validation batches per epoch
    pub fn validation_steps(&self) -> usize {
        self.validation_samples / self.batch_size.max(1)
    }

    pub fn time_decay(&self) -> TimeDecay {
        TimeDecay::new(self.decay)
    }

    /// Base learning rate for a 0-based epoch
    pub fn epoch_lr(&self, epoch: usize) -> f64 {
        self.schedule.get_lr(self.learning_rate, epoch)
    }

    /// Network configuration matching this run
    pub fn model_config(&self) -> MobileNetV2Config {
        MobileNetV2Config::new()
            .with_num_classes(self.num_classes)
            .with_multiplier(self.multiplier)
            .with_input_size(self.image_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClassifierError::Config("batch_size must be greater than zero".into()));
        }
        if self.epochs == 0 {
            return Err(ClassifierError::Config("epochs must be greater than zero".into()));
        }
        if self.image_size == 0 {
            return Err(ClassifierError::Config("image_size must be greater than zero".into()));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(ClassifierError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.decay >= 0.0) {
            return Err(ClassifierError::Config(format!(
                "decay must not be negative, got {}",
                self.decay
            )));
        }
        if self.steps_per_epoch() == 0 {
            return Err(ClassifierError::Config(format!(
                "train_samples ({}) is smaller than batch_size ({}), no training steps per epoch",
                self.train_samples, self.batch_size
            )));
        }
        if self.validation_steps() == 0 {
            return Err(ClassifierError::Config(format!(
                "validation_samples ({}) is smaller than batch_size ({}), no validation steps",
                self.validation_samples, self.batch_size
            )));
        }
        if self.model_name.trim().is_empty() {
            return Err(ClassifierError::Config("model_name must not be empty".into()));
        }
        CheckpointNamer::parse(&self.model_name)?;

        self.schedule.validate().map_err(ClassifierError::Config)?;
        self.model_config().validate()
    }
}

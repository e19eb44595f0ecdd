//! Inference Predictor Module
//!
//! Loads weights saved by the training checkpoint monitor and classifies images.

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    module::Module,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{Augmenter, ImageBatch, ImageBatcher, ImageItem};
use crate::model::{MobileNetV2, MobileNetV2Config};
use crate::training::checkpoint::{sidecar_path, CheckpointMetadata, ModelInfo};
use crate::utils::error::{ClassifierError, Result, ResultExt};

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,
    /// Predicted class index
    pub label: usize,
    /// Predicted class name
    pub class_name: String,
    /// Probability of the predicted class
    pub confidence: f32,
    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Pick the most probable class
    pub fn from_probabilities(
        probabilities: Vec<f32>,
        class_names: &[String],
        image_path: Option<PathBuf>,
    ) -> Self {
        let (label, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .unwrap_or((0, 0.0));

        Self {
            image_path,
            label,
            class_name: class_names
                .get(label)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            confidence,
            probabilities,
        }
    }

    /// Pretty print the prediction result
    pub fn display(&self, class_names: &[String]) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {}\n", path.display()));
        }
        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.class_name, self.label
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));

        for (idx, prob) in self.probabilities.iter().enumerate() {
            let name = class_names.get(idx).map(String::as_str).unwrap_or("?");
            output.push_str(&format!("  {:>3} {:<24} {:6.2}%\n", idx, name, prob * 100.0));
        }

        output
    }
}

/// A reloaded network plus what is needed to feed it
pub struct Predictor<B: Backend> {
    pub model: MobileNetV2<B>,
    pub info: ModelInfo,
    batcher: ImageBatcher,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Wrap an in-memory model
    pub fn new(model: MobileNetV2<B>, info: ModelInfo, device: B::Device) -> Self {
        Self {
            batcher: ImageBatcher::new(info.image_size),
            model,
            info,
            device,
        }
    }

    /// Load weights and the JSON metadata saved next to them
    pub fn load(weights: &Path, device: &B::Device) -> Result<Self> {
        let metadata_path = sidecar_path(weights);
        let metadata = CheckpointMetadata::load(&metadata_path)
            .with_context(|| format!("Missing checkpoint metadata {}", metadata_path.display()))?;
        let info = metadata.model;

        let model = MobileNetV2Config::new()
            .with_num_classes(info.num_classes())
            .with_multiplier(info.multiplier)
            .with_input_size(info.image_size)
            .init::<B>(device)?
            .load_file(weights.to_path_buf(), &CompactRecorder::new(), device)
            .map_err(|e| {
                ClassifierError::Model(format!(
                    "Failed to load weights {}: {:?}",
                    weights.display(),
                    e
                ))
            })?;

        info!(
            "Loaded checkpoint from epoch {} ({} classes, multiplier {}, val_acc {:.4})",
            metadata.epoch,
            info.num_classes(),
            info.multiplier,
            metadata.metrics.val_accuracy
        );

        Ok(Self::new(model, info, device.clone()))
    }

    pub fn class_names(&self) -> &[String] {
        &self.info.class_names
    }

    pub fn image_size(&self) -> usize {
        self.info.image_size
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Classify decoded items
    pub fn predict_items(&self, items: Vec<ImageItem>) -> Result<Vec<Prediction>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let paths: Vec<PathBuf> = items.iter().map(|item| item.path.clone()).collect();
        let batch: ImageBatch<B> = self.batcher.batch(items, &self.device);
        let probabilities: Vec<f32> = self
            .model
            .forward_softmax(batch.images)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| ClassifierError::Model(format!("Failed to read output: {:?}", e)))?;

        let num_classes = self.model.num_classes();
        Ok(probabilities
            .chunks(num_classes)
            .zip(paths)
            .map(|(probs, path)| {
                Prediction::from_probabilities(probs.to_vec(), self.class_names(), Some(path))
            })
            .collect())
    }

    /// Classify a single image file
    pub fn predict_path(&self, path: &Path) -> Result<Prediction> {
        let item = ImageItem::load(path, 0, self.image_size(), &Augmenter::validation(), false)?;
        self.predict_items(vec![item])?
            .pop()
            .context("Model returned no prediction")
    }
}

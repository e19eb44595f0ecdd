//! Training loop for the MobileNetV2 classifier
//!
//! Each epoch runs a fixed number of optimizer steps drawn from an endless
//! training flow, followed by a fixed number of validation batches:
//! - Forward pass, cross-entropy loss on the logits, backward pass
//! - Adam step with the epoch learning rate shrunk by per-iteration time decay
//! - Validation on the inner (non-autodiff) backend
//! - Best-model checkpointing on validation accuracy

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::checkpoint::{BestCheckpoint, ModelInfo};
use super::config::TrainingConfig;
use super::scheduler::TimeDecay;
use crate::dataset::{DirectoryFlow, FlowConfig, ImageBatch, ImageBatcher, ImageFolder, ImageItem};
use crate::model::MobileNetV2;
use crate::utils::error::{ClassifierError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::RunningAverage;

/// Adam epsilon used for every run
pub const ADAM_EPSILON: f32 = 1e-7;

/// Metrics reported at the end of an epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 0-based epoch index
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Epoch learning rate before time decay
    pub learning_rate: f64,
}

/// Per-epoch metrics of a finished run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Weights of the best epoch, if any were saved
    pub best_checkpoint: Option<PathBuf>,
}

impl TrainingHistory {
    /// Epoch with the highest validation accuracy (earliest on ties)
    pub fn best_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().fold(None, |best, m| match best {
            Some(b) if b.val_accuracy >= m.val_accuracy => Some(b),
            _ if m.val_accuracy.is_nan() => best,
            _ => Some(m),
        })
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

/// Loss and accuracy of one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub loss: f64,
    pub correct: usize,
    pub count: usize,
}

/// Cross-entropy loss and correct-prediction count for a batch
fn classification_loss<B: Backend>(
    model: &MobileNetV2<B>,
    batch: ImageBatch<B>,
) -> (Tensor<B, 1>, usize, usize) {
    let count = batch.targets.dims()[0];
    let output = model.forward(batch.images);

    let loss = CrossEntropyLossConfig::new()
        .init(&output.device())
        .forward(output.clone(), batch.targets.clone());

    let predictions = output.argmax(1).reshape([count]);
    let correct: i64 = predictions
        .equal(batch.targets)
        .int()
        .sum()
        .into_scalar()
        .elem();

    (loss, correct as usize, count)
}

/// Owns the model and optimizer state of a run
pub struct Trainer<B: AutodiffBackend> {
    /// Model being trained
    pub model: MobileNetV2<B>,
    optimizer: OptimizerAdaptor<Adam, MobileNetV2<B>, B>,
    batcher: ImageBatcher,
    decay: TimeDecay,
    iterations: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: MobileNetV2<B>, config: &TrainingConfig, device: B::Device) -> Self {
        let optimizer = AdamConfig::new()
            .with_beta_1(0.9)
            .with_beta_2(0.999)
            .with_epsilon(ADAM_EPSILON)
            .init();

        Self {
            model,
            optimizer,
            batcher: ImageBatcher::new(config.image_size),
            decay: config.time_decay(),
            iterations: 0,
            device,
        }
    }

    /// Optimizer steps taken since training began
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Learning rate the next step will use
    pub fn current_lr(&self, epoch_lr: f64) -> f64 {
        self.decay.apply(epoch_lr, self.iterations)
    }

    /// One optimizer step
    pub fn train_step(&mut self, items: Vec<ImageItem>, epoch_lr: f64) -> StepOutput {
        let batch: ImageBatch<B> = self.batcher.batch(items, &self.device);
        let (loss, correct, count) = classification_loss(&self.model, batch);
        let loss_value: f64 = loss.clone().into_scalar().elem();

        let lr = self.current_lr(epoch_lr);
        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optimizer.step(lr, self.model.clone(), grads);
        self.iterations += 1;

        StepOutput {
            loss: loss_value,
            correct,
            count,
        }
    }

    /// Evaluate a batch without tracking gradients
    pub fn validation_step(
        &self,
        model: &MobileNetV2<B::InnerBackend>,
        items: Vec<ImageItem>,
    ) -> StepOutput {
        let batch: ImageBatch<B> = self.batcher.batch(items, &self.device);
        let batch = ImageBatch {
            images: batch.images.inner(),
            targets: batch.targets.inner(),
        };

        let (loss, correct, count) = classification_loss(model, batch);
        StepOutput {
            loss: loss.into_scalar().elem(),
            correct,
            count,
        }
    }

    /// Run the training steps and validation batches of one epoch
    pub fn run_epoch(
        &mut self,
        epoch: usize,
        epoch_lr: f64,
        steps: usize,
        validation_steps: usize,
        train_flow: &mut DirectoryFlow,
        val_flow: &mut DirectoryFlow,
        progress: bool,
    ) -> Result<EpochMetrics> {
        let bar = if progress {
            ProgressBar::new(steps as u64)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template(
                "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );

        let mut loss = RunningAverage::new();
        let (mut correct, mut seen) = (0usize, 0usize);

        for _ in 0..steps {
            let items = train_flow.next_batch()?;
            let step = self.train_step(items, epoch_lr);

            loss.add_weighted(step.loss, step.count);
            correct += step.correct;
            seen += step.count;

            bar.set_message(format!(
                "loss: {:.4} - acc: {:.4}",
                loss.average(),
                correct as f64 / seen.max(1) as f64
            ));
            bar.inc(1);
        }
        bar.finish_and_clear();

        let valid_model = self.model.valid();
        let mut val_loss = RunningAverage::new();
        let (mut val_correct, mut val_seen) = (0usize, 0usize);

        for _ in 0..validation_steps {
            let items = val_flow.next_batch()?;
            let step = self.validation_step(&valid_model, items);

            val_loss.add_weighted(step.loss, step.count);
            val_correct += step.correct;
            val_seen += step.count;
        }

        Ok(EpochMetrics {
            epoch,
            loss: loss.average(),
            accuracy: correct as f64 / seen.max(1) as f64,
            val_loss: val_loss.average(),
            val_accuracy: val_correct as f64 / val_seen.max(1) as f64,
            learning_rate: epoch_lr,
        })
    }
}

/// Open a class folder and check it has the expected classes
fn open_folder(path: &Path, expected: Option<&[String]>, num_classes: usize) -> Result<ImageFolder> {
    let folder = ImageFolder::new(path)?;

    if folder.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "no images found under {}",
            path.display()
        )));
    }
    if folder.num_classes() != num_classes {
        return Err(ClassifierError::Config(format!(
            "{} has {} classes but the model is configured for {}",
            path.display(),
            folder.num_classes(),
            num_classes
        )));
    }
    if let Some(expected) = expected {
        if folder.classes() != expected {
            return Err(ClassifierError::Dataset(format!(
                "class folders of {} ({:?}) differ from the training classes ({:?})",
                path.display(),
                folder.classes(),
                expected
            )));
        }
    }

    Ok(folder)
}

/// Train a fresh network as described by `config`
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
pub fn fit<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
    progress: bool,
) -> Result<TrainingHistory> {
    config.validate()?;

    let train_folder = open_folder(&config.train_dir, None, config.num_classes)?;
    let val_folder = open_folder(
        &config.test_dir,
        Some(train_folder.classes()),
        config.num_classes,
    )?;
    let class_names = train_folder.classes().to_vec();

    info!(
        "Found {} training and {} validation images in classes {:?}",
        train_folder.len(),
        val_folder.len(),
        class_names
    );
    if train_folder.len() < config.train_samples {
        warn!(
            "train_samples is {} but {} holds {} images; batches repeat within an epoch",
            config.train_samples,
            config.train_dir.display(),
            train_folder.len()
        );
    }

    let steps = config.steps_per_epoch();
    let validation_steps = config.validation_steps();

    let mut train_flow = DirectoryFlow::new(
        train_folder,
        FlowConfig::training(config.image_size, config.batch_size, config.seed),
    )?;
    let mut val_flow = DirectoryFlow::new(
        val_folder,
        FlowConfig::validation(config.image_size, config.batch_size, config.seed.wrapping_add(1)),
    )?;

    let model = config.model_config().init::<B>(device)?;
    let mut trainer = Trainer::new(model, config, device.clone());

    let mut checkpoint = BestCheckpoint::new(
        &config.save_dir,
        &config.model_name,
        ModelInfo {
            class_names,
            multiplier: config.multiplier,
            image_size: config.image_size,
        },
    )?;

    info!(
        "Training for {} epochs: {} steps per epoch, {} validation steps, schedule {}",
        config.epochs,
        steps,
        validation_steps,
        config.schedule.description()
    );

    let mut logger = TrainingLogger::new(config.epochs);
    let mut history = TrainingHistory::default();

    for epoch in 0..config.epochs {
        let epoch_lr = config.epoch_lr(epoch);
        logger.start_epoch(epoch, epoch_lr);

        let metrics = trainer.run_epoch(
            epoch,
            epoch_lr,
            steps,
            validation_steps,
            &mut train_flow,
            &mut val_flow,
            progress,
        )?;

        logger.end_epoch(
            metrics.loss,
            metrics.accuracy,
            metrics.val_loss,
            metrics.val_accuracy,
        );
        checkpoint.offer(&trainer.model, &metrics)?;
        history.epochs.push(metrics);
    }

    logger.log_complete(checkpoint.best());
    history.best_checkpoint = checkpoint.best_path().map(Path::to_path_buf);

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MobileNetV2Config;
    use crate::training::checkpoint::{sidecar_path, CheckpointMetadata};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn metrics(epoch: usize, val_accuracy: f64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            loss: 1.0,
            accuracy: 0.5,
            val_loss: 1.0,
            val_accuracy,
            learning_rate: 0.001,
        }
    }

    fn write_split(root: &Path, per_class: usize) {
        for (class, color) in [("bad", [200u8, 40, 10]), ("good", [250u8, 160, 20])] {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                RgbImage::from_fn(40, 40, |x, y| {
                    let shade = ((x + y + i as u32) % 7) as u8;
                    Rgb([color[0] - shade, color[1], color[2] + shade])
                })
                .save(dir.join(format!("{i}.png")))
                .unwrap();
            }
        }
    }

    fn tiny_config(root: &Path) -> TrainingConfig {
        TrainingConfig {
            train_dir: root.join("train"),
            test_dir: root.join("test"),
            save_dir: root.join("models"),
            multiplier: 0.5,
            image_size: 32,
            batch_size: 4,
            epochs: 2,
            train_samples: 8,
            validation_samples: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_history_best_epoch() {
        let history = TrainingHistory {
            epochs: vec![
                metrics(0, 0.5),
                metrics(1, 0.75),
                metrics(2, f64::NAN),
                metrics(3, 0.75),
            ],
            best_checkpoint: None,
        };
        assert_eq!(history.best_epoch().unwrap().epoch, 1);
        assert!(TrainingHistory::default().best_epoch().is_none());
    }

    #[test]
    fn test_train_step_counts_iterations_and_decays_lr() {
        let device = Default::default();
        let config = TrainingConfig {
            image_size: 32,
            ..Default::default()
        };
        let model = MobileNetV2Config::new()
            .with_multiplier(0.5)
            .with_input_size(32)
            .init::<TestBackend>(&device)
            .unwrap();
        let mut trainer = Trainer::new(model, &config, device);

        assert_eq!(trainer.current_lr(0.001), 0.001);

        let items: Vec<ImageItem> = (0..2)
            .map(|i| ImageItem::from_data(vec![0.1 * i as f32; 3 * 32 * 32], i, PathBuf::from("x")))
            .collect();
        let step = trainer.train_step(items, 0.001);

        assert_eq!(step.count, 2);
        assert!(step.correct <= 2);
        assert!(step.loss.is_finite());
        assert_eq!(trainer.iterations(), 1);
        assert!((trainer.current_lr(0.001) - 0.001 / 1.0005).abs() < 1e-12);
    }

    #[test]
    fn test_fit_runs_and_checkpoints() {
        let dir = TempDir::new().unwrap();
        write_split(&dir.path().join("train"), 4);
        write_split(&dir.path().join("test"), 2);
        let config = tiny_config(dir.path());

        let history = fit::<TestBackend>(&config, &Default::default(), false).unwrap();

        assert_eq!(history.len(), 2);
        for m in &history.epochs {
            assert!(m.loss.is_finite());
            assert!((0.0..=1.0).contains(&m.val_accuracy));
        }

        // First epoch always improves on -inf
        let best = history.best_checkpoint.expect("a checkpoint was saved");
        assert!(best.exists());
        let meta = CheckpointMetadata::load(&sidecar_path(&best)).unwrap();
        assert_eq!(meta.model.class_names, vec!["bad", "good"]);
        assert_eq!(meta.model.image_size, 32);
    }

    #[test]
    fn test_fit_rejects_class_mismatch() {
        let dir = TempDir::new().unwrap();
        write_split(&dir.path().join("train"), 1);
        write_split(&dir.path().join("test"), 1);
        std::fs::create_dir_all(dir.path().join("test/extra")).unwrap();

        let err = fit::<TestBackend>(&tiny_config(dir.path()), &Default::default(), false)
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Config(_)));

        let config = TrainingConfig {
            num_classes: 3,
            ..tiny_config(dir.path())
        };
        let err = fit::<TestBackend>(&config, &Default::default(), false).unwrap_err();
        assert!(matches!(err, ClassifierError::Config(_)));
    }

    #[test]
    fn test_fit_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = fit::<TestBackend>(&tiny_config(dir.path()), &Default::default(), false)
            .unwrap_err();
        assert!(matches!(err, ClassifierError::PathNotFound(_)));
    }
}

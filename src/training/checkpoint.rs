//! Best-model checkpointing
//!
//! This module provides:
//! - File name templates with epoch and metric placeholders
//! - A monitor that saves weights only when validation accuracy improves
//! - JSON metadata written next to each weights file so it can be reloaded

use std::fs;
use std::path::{Path, PathBuf};

use burn::{module::Module, record::CompactRecorder, tensor::backend::Backend};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::trainer::EpochMetrics;
use crate::model::MobileNetV2;
use crate::utils::error::{ClassifierError, Result};

/// Extension burn's compact recorder gives weight files
pub const WEIGHTS_EXTENSION: &str = "mpk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Epoch,
    Loss,
    Acc,
    ValLoss,
    ValAcc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldFormat {
    Plain,
    ZeroPad(usize),
    Fixed(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Field, FieldFormat),
}

/// Expands a file name template such as `weights.{epoch:03}-{val_acc:.4f}`
///
/// Supported placeholders are `epoch`, `loss`, `acc`, `val_loss` and
/// `val_acc`. `epoch` accepts a zero-padded width (`{epoch:03}`), the
/// metrics accept a fixed precision (`{val_acc:.4f}`). `{{` and `}}` are
/// literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointNamer {
    template: String,
    segments: Vec<Segment>,
}

impl CheckpointNamer {
    pub fn parse(template: &str) -> Result<Self> {
        let err = |msg: String| ClassifierError::Config(format!("model_name '{template}': {msg}"));

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(err("unmatched '}'".into())),
                '{' => {
                    let mut body = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(err("unclosed '{'".into())),
                            Some(ch) => body.push(ch),
                        }
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Self::parse_placeholder(&body).map_err(err)?);
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    fn parse_placeholder(body: &str) -> std::result::Result<Segment, String> {
        let (name, spec) = match body.split_once(':') {
            Some((name, spec)) => (name.trim(), Some(spec.trim())),
            None => (body.trim(), None),
        };

        let field = match name {
            "epoch" => Field::Epoch,
            "loss" => Field::Loss,
            "acc" | "accuracy" => Field::Acc,
            "val_loss" => Field::ValLoss,
            "val_acc" | "val_accuracy" => Field::ValAcc,
            other => return Err(format!("unknown placeholder '{other}'")),
        };

        let format = match (field, spec) {
            (_, None) | (_, Some("")) => FieldFormat::Plain,
            (Field::Epoch, Some(spec)) => {
                let digits = spec.strip_suffix('d').unwrap_or(spec);
                let width = digits
                    .parse::<usize>()
                    .map_err(|_| format!("bad epoch format '{spec}'"))?;
                FieldFormat::ZeroPad(width)
            }
            (_, Some(spec)) => {
                let precision = spec
                    .strip_prefix('.')
                    .and_then(|s| s.strip_suffix('f'))
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| format!("bad metric format '{spec}'"))?;
                FieldFormat::Fixed(precision)
            }
        };

        Ok(Segment::Placeholder(field, format))
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the name for an epoch; the epoch number in the name is 1-based
    pub fn render(&self, metrics: &EpochMetrics) -> String {
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(Field::Epoch, format) => {
                    let epoch = metrics.epoch + 1;
                    match format {
                        FieldFormat::ZeroPad(width) => {
                            out.push_str(&format!("{:0width$}", epoch, width = *width));
                        }
                        _ => {
                            out.push_str(&epoch.to_string());
                        }
                    }
                }
                Segment::Placeholder(field, format) => {
                    let value = match field {
                        Field::Loss => metrics.loss,
                        Field::Acc => metrics.accuracy,
                        Field::ValLoss => metrics.val_loss,
                        _ => metrics.val_accuracy,
                    };
                    match format {
                        FieldFormat::Fixed(precision) => {
                            out.push_str(&format!("{:.prec$}", value, prec = *precision));
                        }
                        _ => out.push_str(&plain_float(value)),
                    }
                }
            }
        }

        out
    }
}

/// Shortest round-trip form, keeping a trailing `.0` on whole numbers
fn plain_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Path of the JSON metadata stored next to a weights file
pub fn sidecar_path(weights: &Path) -> PathBuf {
    let name = weights
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(&format!(".{WEIGHTS_EXTENSION}"))
        .unwrap_or(&name);
    weights.with_file_name(format!("{stem}.json"))
}

/// Path of the weights file for a checkpoint name
pub fn weights_path(save_dir: &Path, name: &str) -> PathBuf {
    save_dir.join(format!("{name}.{WEIGHTS_EXTENSION}"))
}

/// What a checkpoint needs to rebuild the network it was saved from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub class_names: Vec<String>,
    pub multiplier: f64,
    pub image_size: usize,
}

impl ModelInfo {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }
}

/// Metadata written next to every saved weights file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// 1-based epoch that produced the weights
    pub epoch: usize,
    pub metrics: EpochMetrics,
    pub model: ModelInfo,
    pub weights_file: String,
    pub timestamp: String,
}

impl CheckpointMetadata {
    pub fn new(metrics: &EpochMetrics, model: &ModelInfo, weights: &Path) -> Self {
        Self {
            epoch: metrics.epoch + 1,
            metrics: metrics.clone(),
            model: model.clone(),
            weights_file: weights
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Save metadata to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load metadata from file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| ClassifierError::Model(format!("Failed to read {:?}: {}", path, e)))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Saves weights whenever validation accuracy strictly improves
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    save_dir: PathBuf,
    namer: CheckpointNamer,
    model: ModelInfo,
    best: f64,
    best_path: Option<PathBuf>,
}

impl BestCheckpoint {
    pub fn new(save_dir: impl Into<PathBuf>, template: &str, model: ModelInfo) -> Result<Self> {
        Ok(Self {
            save_dir: save_dir.into(),
            namer: CheckpointNamer::parse(template)?,
            model,
            best: f64::NEG_INFINITY,
            best_path: None,
        })
    }

    /// Best validation accuracy seen so far
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Weights file of the best epoch, if any was saved
    pub fn best_path(&self) -> Option<&Path> {
        self.best_path.as_deref()
    }

    /// Whether `value` would trigger a save
    pub fn is_improvement(&self, value: f64) -> bool {
        value > self.best
    }

    /// Offer an epoch's model. Returns the weights path when it was saved.
    pub fn offer<B: Backend>(
        &mut self,
        model: &MobileNetV2<B>,
        metrics: &EpochMetrics,
    ) -> Result<Option<PathBuf>> {
        let current = metrics.val_accuracy;
        let epoch = metrics.epoch + 1;

        if !self.is_improvement(current) {
            info!(
                "Epoch {:05}: val_acc did not improve from {:.5}",
                epoch, self.best
            );
            return Ok(None);
        }

        fs::create_dir_all(&self.save_dir)?;
        let path = weights_path(&self.save_dir, &self.namer.render(metrics));

        info!(
            "Epoch {:05}: val_acc improved from {:.5} to {:.5}, saving model to {}",
            epoch,
            self.best,
            current,
            path.display()
        );

        model
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .map_err(|e| ClassifierError::Model(format!("Failed to save weights: {:?}", e)))?;

        CheckpointMetadata::new(metrics, &self.model, &path).save(&sidecar_path(&path))?;

        self.best = current;
        self.best_path = Some(path.clone());
        Ok(Some(path))
    }
}

//! Image Folder Loader
//!
//! Discovers a dataset stored as one sub-directory per class. Class labels
//! are assigned in sorted directory-name order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::is_image_file;
use crate::utils::error::{ClassifierError, Result};

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// Dataset discovered from a directory tree
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    classes: Vec<String>,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan a directory structured as:
    /// ```text
    /// root_dir/
    /// ├── class_a/
    /// │   ├── image1.jpg
    /// │   └── image2.jpg
    /// └── class_b/
    ///     └── ...
    /// ```
    ///
    /// Images are collected recursively below each class directory.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Scanning image folder: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(ClassifierError::PathNotFound(root_dir));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let before = samples.len();

            for entry in WalkDir::new(root_dir.join(class_name))
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && is_image_file(entry.path()) {
                    samples.push(ImageSample {
                        path: entry.path().to_path_buf(),
                        label,
                    });
                }
            }

            debug!(
                "Class '{}' (label {}): {} images",
                class_name,
                label,
                samples.len() - before
            );
        }

        info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            classes.len()
        );

        Ok(Self {
            root_dir,
            classes,
            samples,
        })
    }

    /// Build a folder from an already known listing
    pub fn from_parts(root_dir: PathBuf, classes: Vec<String>, samples: Vec<ImageSample>) -> Self {
        Self {
            root_dir,
            classes,
            samples,
        }
    }

    /// Class names, indexed by label
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Number of images per label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Get statistics about the dataset
    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            root_dir: self.root_dir.clone(),
            total_samples: self.len(),
            class_counts: self
                .classes
                .iter()
                .cloned()
                .zip(self.class_counts())
                .collect(),
        }
    }
}

/// Statistics about a folder dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub root_dir: PathBuf,
    pub total_samples: usize,
    pub class_counts: BTreeMap<String, usize>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset: {}", self.root_dir.display());
        println!("  Total samples: {}", self.total_samples);

        for (name, count) in &self.class_counts {
            let bar_len = if self.total_samples > 0 {
                (*count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            println!("    {:30} {:5} {}", name, count, "█".repeat(bar_len));
        }
    }
}

//! Endless batch stream over an image folder
//!
//! Each pass visits every sample once. When shuffling is enabled the order is
//! redrawn at the start of every pass. The final batch of a pass holds the
//! remainder and may be shorter than `batch_size`.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::augmentation::Augmenter;
use super::burn_dataset::ImageItem;
use super::loader::ImageFolder;
use super::DEFAULT_IMAGE_SIZE;
use crate::utils::error::{ClassifierError, Result};

/// Settings for a directory flow
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub image_size: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    pub augmenter: Augmenter,
    pub seed: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            batch_size: 32,
            shuffle: true,
            augmenter: Augmenter::validation(),
            seed: 42,
        }
    }
}

impl FlowConfig {
    /// Shuffled, flipped, rescaled batches
    pub fn training(image_size: usize, batch_size: usize, seed: u64) -> Self {
        Self {
            image_size,
            batch_size,
            shuffle: true,
            augmenter: Augmenter::training(),
            seed,
        }
    }

    /// Shuffled, rescaled batches
    pub fn validation(image_size: usize, batch_size: usize, seed: u64) -> Self {
        Self {
            image_size,
            batch_size,
            shuffle: true,
            augmenter: Augmenter::validation(),
            seed,
        }
    }
}

/// Cycling batch iterator over an [`ImageFolder`]
#[derive(Debug)]
pub struct DirectoryFlow {
    folder: ImageFolder,
    config: FlowConfig,
    rng: ChaCha8Rng,
    order: Vec<usize>,
    cursor: usize,
    passes: usize,
}

impl DirectoryFlow {
    pub fn new(folder: ImageFolder, config: FlowConfig) -> Result<Self> {
        if folder.is_empty() {
            return Err(ClassifierError::Dataset(format!(
                "no images found under {}",
                folder.root_dir.display()
            )));
        }
        if config.batch_size == 0 {
            return Err(ClassifierError::Config(
                "batch_size must be greater than zero".into(),
            ));
        }

        let order = (0..folder.len()).collect();
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        Ok(Self {
            folder,
            config,
            rng,
            order,
            cursor: 0,
            passes: 0,
        })
    }

    pub fn folder(&self) -> &ImageFolder {
        &self.folder
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Number of samples in one pass
    pub fn len(&self) -> usize {
        self.folder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folder.is_empty()
    }

    /// Batches needed to cover one pass, counting a short final batch
    pub fn batches_per_pass(&self) -> usize {
        self.len().div_ceil(self.config.batch_size)
    }

    /// Completed passes over the folder
    pub fn passes_completed(&self) -> usize {
        self.passes
    }

    /// Sample indices of the next batch
    pub fn next_indices(&mut self) -> Vec<usize> {
        if self.cursor == 0 && self.config.shuffle {
            self.order.shuffle(&mut self.rng);
        }

        let end = (self.cursor + self.config.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();

        if end >= self.order.len() {
            self.cursor = 0;
            self.passes += 1;
            debug!("Flow over {:?} finished pass {}", self.folder.root_dir, self.passes);
        } else {
            self.cursor = end;
        }

        indices
    }

    /// Decode the next batch of images
    pub fn next_batch(&mut self) -> Result<Vec<ImageItem>> {
        let indices = self.next_indices();
        let mut items = Vec::with_capacity(indices.len());

        for idx in indices {
            let sample = &self.folder.samples()[idx];
            let flip = self.config.augmenter.sample_flip(&mut self.rng);
            items.push(ImageItem::load(
                &sample.path,
                sample.label,
                self.config.image_size,
                &self.config.augmenter,
                flip,
            )?);
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImageSample;
    use image::{Rgb, RgbImage};
    use std::collections::HashSet;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fake_folder(n: usize) -> ImageFolder {
        let samples = (0..n)
            .map(|i| ImageSample {
                path: PathBuf::from(format!("img_{i}.jpg")),
                label: i % 2,
            })
            .collect();
        ImageFolder::from_parts(
            PathBuf::from("data"),
            vec!["a".into(), "b".into()],
            samples,
        )
    }

    fn config(batch_size: usize, shuffle: bool) -> FlowConfig {
        FlowConfig {
            batch_size,
            shuffle,
            ..FlowConfig::default()
        }
    }

    #[test]
    fn test_sequential_with_short_last_batch() {
        let mut flow = DirectoryFlow::new(fake_folder(5), config(2, false)).unwrap();

        assert_eq!(flow.batches_per_pass(), 3);
        assert_eq!(flow.next_indices(), vec![0, 1]);
        assert_eq!(flow.next_indices(), vec![2, 3]);
        assert_eq!(flow.next_indices(), vec![4]);
        assert_eq!(flow.passes_completed(), 1);
        assert_eq!(flow.next_indices(), vec![0, 1]);
    }

    #[test]
    fn test_shuffled_pass_covers_everything() {
        let mut flow = DirectoryFlow::new(fake_folder(10), config(3, true)).unwrap();

        for _ in 0..2 {
            let mut seen = HashSet::new();
            for _ in 0..flow.batches_per_pass() {
                seen.extend(flow.next_indices());
            }
            assert_eq!(seen.len(), 10);
        }
        assert_eq!(flow.passes_completed(), 2);
    }

    #[test]
    fn test_reshuffles_each_pass() {
        let mut flow = DirectoryFlow::new(fake_folder(32), config(32, true)).unwrap();
        let first = flow.next_indices();
        let second = flow.next_indices();

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }

    #[test]
    fn test_same_seed_same_order() {
        let mut a = DirectoryFlow::new(fake_folder(20), config(4, true)).unwrap();
        let mut b = DirectoryFlow::new(fake_folder(20), config(4, true)).unwrap();
        for _ in 0..10 {
            assert_eq!(a.next_indices(), b.next_indices());
        }
    }

    #[test]
    fn test_empty_folder_rejected() {
        let err = DirectoryFlow::new(fake_folder(0), config(2, false)).unwrap_err();
        assert!(matches!(err, ClassifierError::Dataset(_)));

        let err = DirectoryFlow::new(fake_folder(3), config(0, false)).unwrap_err();
        assert!(matches!(err, ClassifierError::Config(_)));
    }

    #[test]
    fn test_next_batch_decodes_images() {
        let dir = TempDir::new().unwrap();
        for (class, color) in [("a", [255, 128, 0]), ("b", [0, 64, 255])] {
            std::fs::create_dir_all(dir.path().join(class)).unwrap();
            for i in 0..3 {
                RgbImage::from_pixel(6, 6, Rgb(color))
                    .save(dir.path().join(class).join(format!("{i}.png")))
                    .unwrap();
            }
        }

        let folder = ImageFolder::new(dir.path()).unwrap();
        let mut flow = DirectoryFlow::new(folder, FlowConfig::training(4, 4, 1)).unwrap();

        let first = flow.next_batch().unwrap();
        let second = flow.next_batch().unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 2);
        for item in first.iter().chain(&second) {
            assert_eq!(item.image.len(), 3 * 4 * 4);
            let red = item.image[0];
            let expected = if item.label == 0 { 1.0 } else { 0.0 };
            assert_eq!(red, expected);
        }
    }
}

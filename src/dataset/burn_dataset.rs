//! Burn Dataset Integration
//!
//! Implements Burn's Dataset trait and Batcher for folder datasets.
//! Items are decoded on demand; nothing is cached in memory.

use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::augmentation::Augmenter;
use super::loader::ImageFolder;
use crate::utils::error::{ClassifierError, Result};

/// A single decoded image ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageItem {
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: PathBuf,
}

impl ImageItem {
    /// Decode, convert to RGB, nearest-neighbour resize, optionally mirror and rescale
    pub fn load(
        path: &Path,
        label: usize,
        image_size: usize,
        augmenter: &Augmenter,
        flip: bool,
    ) -> Result<Self> {
        let rgb = image::open(path)
            .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .to_rgb8();

        let size = image_size as u32;
        let resized = if rgb.dimensions() == (size, size) {
            rgb
        } else {
            imageops::resize(&rgb, size, size, FilterType::Nearest)
        };

        let augmented = augmenter.transform(resized, flip);

        Ok(Self {
            image: augmenter.to_chw(&augmented),
            label,
            path: path.to_path_buf(),
        })
    }

    /// Create from pre-loaded image data
    pub fn from_data(image: Vec<f32>, label: usize, path: PathBuf) -> Self {
        Self { image, label, path }
    }
}

/// Folder dataset implementing Burn's Dataset trait
///
/// Uses the validation augmenter, so every pass sees the same pixels.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    folder: ImageFolder,
    image_size: usize,
    augmenter: Augmenter,
}

impl ImageFolderDataset {
    pub fn new(folder: ImageFolder, image_size: usize) -> Self {
        Self {
            folder,
            image_size,
            augmenter: Augmenter::validation(),
        }
    }

    pub fn folder(&self) -> &ImageFolder {
        &self.folder
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Load an item, surfacing decode errors instead of skipping them
    pub fn try_get(&self, index: usize) -> Result<ImageItem> {
        let sample = self.folder.samples().get(index).ok_or_else(|| {
            ClassifierError::InvalidInput(format!(
                "index {} out of range for {} samples",
                index,
                self.folder.len()
            ))
        })?;

        ImageItem::load(
            &sample.path,
            sample.label,
            self.image_size,
            &self.augmenter,
            false,
        )
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        if index >= self.folder.len() {
            return None;
        }

        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping unreadable image: {}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.folder.len()
    }
}

/// A batch of images for training or evaluation
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking decoded items into tensors
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size: usize,
}

impl ImageBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.image_size, self.image_size);

        let images_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImageSample;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn write_png(path: &Path, width: u32, height: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_load_resizes_and_rescales() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 16, 8);

        let item = ImageItem::load(&path, 1, 4, &Augmenter::validation(), false).unwrap();

        assert_eq!(item.image.len(), 3 * 4 * 4);
        assert_eq!(item.label, 1);
        // Left column is red, right column is blue
        assert_eq!(item.image[0], 1.0);
        assert_eq!(item.image[3], 0.0);
        assert_eq!(item.image[2 * 16 + 3], 1.0);
    }

    #[test]
    fn test_load_flipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 4, 4);

        let item = ImageItem::load(&path, 0, 4, &Augmenter::training(), true).unwrap();
        assert_eq!(item.image[0], 0.0);
        assert_eq!(item.image[3], 1.0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ImageItem::load(
            Path::new("/nonexistent/img.png"),
            0,
            4,
            &Augmenter::validation(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ClassifierError::ImageLoad(_, _)));
    }

    #[test]
    fn test_dataset_skips_unreadable() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("cls/good.png");
        let bad = dir.path().join("cls/bad.png");
        write_png(&good, 4, 4);
        std::fs::write(&bad, b"not an image").unwrap();

        let folder = ImageFolder::from_parts(
            dir.path().to_path_buf(),
            vec!["cls".into()],
            vec![
                ImageSample { path: good, label: 0 },
                ImageSample { path: bad, label: 0 },
            ],
        );
        let dataset = ImageFolderDataset::new(folder, 4);

        assert_eq!(dataset.len(), 2);
        assert!(dataset.get(0).is_some());
        assert!(dataset.get(1).is_none());
        assert!(dataset.try_get(1).is_err());
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let items = vec![
            ImageItem::from_data(vec![0.5; 3 * 4 * 4], 0, PathBuf::from("a")),
            ImageItem::from_data(vec![0.25; 3 * 4 * 4], 1, PathBuf::from("b")),
        ];

        let batch: ImageBatch<TestBackend> = ImageBatcher::new(4).batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [2]);
        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![0, 1]);
    }
}

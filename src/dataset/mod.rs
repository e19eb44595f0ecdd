//! Dataset module for directory-of-classes image data
//!
//! This module provides functionality for:
//! - Discovering a dataset laid out as `<root>/<class_name>/<image>`
//! - Light augmentation (rescaling and random horizontal flips)
//! - Burn `Dataset`/`Batcher` integration
//! - An endless, reshuffling batch stream for step-based training

pub mod augmentation;
pub mod burn_dataset;
pub mod flow;
pub mod loader;

// Re-export main types for convenience
pub use augmentation::Augmenter;
pub use burn_dataset::{ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem};
pub use flow::{DirectoryFlow, FlowConfig};
pub use loader::{DatasetStats, ImageFolder, ImageSample};

/// Image size the network was designed around
pub const DEFAULT_IMAGE_SIZE: usize = 224;

/// File extensions recognized as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// Check whether a path has an image extension
pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("train/orange/a.jpg")));
        assert!(is_image_file(Path::new("train/orange/b.JPEG")));
        assert!(is_image_file(Path::new("c.tiff")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }
}

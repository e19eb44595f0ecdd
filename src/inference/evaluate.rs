//! Whole-directory evaluation

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    tensor::{backend::Backend, Int, Tensor},
};
use tracing::info;

use crate::dataset::{ImageBatch, ImageBatcher, ImageFolderDataset};
use crate::model::MobileNetV2;
use crate::utils::error::{ClassifierError, Result};
use crate::utils::metrics::ConfusionMatrix;

/// Run every image of `dataset` through `model` once, in order
pub fn evaluate<B: Backend>(
    model: &MobileNetV2<B>,
    dataset: &ImageFolderDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<ConfusionMatrix> {
    if batch_size == 0 {
        return Err(ClassifierError::Config(
            "batch_size must be greater than zero".into(),
        ));
    }

    let class_names = dataset.folder().classes().to_vec();
    if class_names.len() != model.num_classes() {
        return Err(ClassifierError::Dataset(format!(
            "dataset has {} classes but the model predicts {}",
            class_names.len(),
            model.num_classes()
        )));
    }

    let batcher = ImageBatcher::new(dataset.image_size());
    let mut matrix = ConfusionMatrix::new(class_names);
    let len = dataset.len();

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items = (start..end)
            .map(|i| dataset.try_get(i))
            .collect::<Result<Vec<_>>>()?;

        let batch: ImageBatch<B> = batcher.batch(items, device);
        let count = batch.targets.dims()[0];
        let predictions: Tensor<B, 1, Int> = model.forward(batch.images).argmax(1).reshape([count]);

        let predicted = int_values(predictions)?;
        let actual = int_values(batch.targets)?;
        for (a, p) in actual.into_iter().zip(predicted) {
            matrix.add(a, p);
        }
    }

    info!(
        "Evaluated {} images: accuracy {:.4}",
        matrix.total(),
        matrix.accuracy()
    );

    Ok(matrix)
}

fn int_values<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let values: Vec<i64> = tensor
        .into_data()
        .convert::<i64>()
        .to_vec()
        .map_err(|e| ClassifierError::Model(format!("Failed to read predictions: {:?}", e)))?;
    Ok(values.into_iter().map(|v| v.max(0) as usize).collect())
}

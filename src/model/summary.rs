//! Layer-by-layer model summary
//!
//! Output shapes are derived from the configuration (input size and strides)
//! rather than by running a forward pass, so summarizing a full-size network
//! costs nothing.

use std::fmt;

use burn::{module::Module, tensor::backend::Backend};

use super::layers::conv_output_size;
use super::mobilenet::{MobileNetV2, MobileNetV2Config};

/// One line of the summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRow {
    pub name: String,
    /// Output shape as [channels, height, width]
    pub output_shape: [usize; 3],
    pub params: usize,
    pub residual: bool,
}

impl LayerRow {
    fn new(name: impl Into<String>, output_shape: [usize; 3], params: usize) -> Self {
        Self {
            name: name.into(),
            output_shape,
            params,
            residual: false,
        }
    }
}

/// Summary of a MobileNetV2 instance
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub input_shape: [usize; 3],
    pub rows: Vec<LayerRow>,
    pub total_params: usize,
}

impl ModelSummary {
    pub fn of<B: Backend>(model: &MobileNetV2<B>, config: &MobileNetV2Config) -> Self {
        let mut rows = Vec::with_capacity(model.blocks.len() + 5);
        let mut size = conv_output_size(config.input_size, 3, 2, 1);

        rows.push(LayerRow::new(
            "stem",
            [config.stem_channels(), size, size],
            model.stem.num_params() + model.stem_bn.num_params(),
        ));

        for (idx, (block, spec)) in model.blocks.iter().zip(config.block_plan()).enumerate() {
            size = conv_output_size(size, 3, spec.stride, 1);
            rows.push(LayerRow {
                name: format!("bottleneck_{:02}", idx + 1),
                output_shape: [spec.out_channels, size, size],
                params: block.num_params(),
                residual: block.has_residual(),
            });
        }

        let head_channels = config.head_channels();
        rows.push(LayerRow::new(
            "head_conv",
            [head_channels, size, size],
            model.head_conv.num_params() + model.head_bn.num_params(),
        ));
        rows.push(LayerRow::new("dropout", [head_channels, size, size], 0));
        rows.push(LayerRow::new("avg_pool", [head_channels, 1, 1], 0));
        rows.push(LayerRow::new(
            "classifier",
            [config.num_classes, 1, 1],
            model.classifier.num_params(),
        ));

        Self {
            input_shape: [config.in_channels, config.input_size, config.input_size],
            rows,
            total_params: model.num_params(),
        }
    }

    /// Spatial size of the last feature map
    pub fn final_feature_size(&self) -> usize {
        self.rows
            .iter()
            .rev()
            .find(|row| row.name == "head_conv")
            .map(|row| row.output_shape[1])
            .unwrap_or(0)
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(64);
        let thin = "-".repeat(64);

        writeln!(f, "{:<20} {:<22} {:>12}  {}", "Layer", "Output Shape", "Param #", "")?;
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "{:<20} {:<22} {:>12}",
            "input",
            format!("{:?}", self.input_shape),
            0
        )?;

        for row in &self.rows {
            writeln!(
                f,
                "{:<20} {:<22} {:>12}  {}",
                row.name,
                format!("{:?}", row.output_shape),
                row.params,
                if row.residual { "+ residual" } else { "" }
            )?;
        }

        writeln!(f, "{}", thin)?;
        writeln!(f, "Total params: {}", self.total_params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_summary_shapes_at_224() {
        let device = Default::default();
        let config = MobileNetV2Config::new().with_multiplier(0.5);
        let model = config.init::<TestBackend>(&device).unwrap();

        let summary = ModelSummary::of(&model, &config);

        assert_eq!(summary.rows.len(), 1 + 17 + 4);
        assert_eq!(summary.rows[0].output_shape, [16, 112, 112]);
        assert_eq!(summary.rows[2].output_shape, [12, 56, 56]);
        assert_eq!(summary.rows[17].output_shape, [160, 7, 7]);
        assert_eq!(summary.final_feature_size(), 7);
        assert_eq!(summary.rows.last().unwrap().output_shape, [2, 1, 1]);
    }

    #[test]
    fn test_summary_params_add_up() {
        let device = Default::default();
        let config = MobileNetV2Config::new().with_multiplier(0.5).with_input_size(64);
        let model = config.init::<TestBackend>(&device).unwrap();

        let summary = ModelSummary::of(&model, &config);
        let row_total: usize = summary.rows.iter().map(|row| row.params).sum();

        assert_eq!(row_total, summary.total_params);
        assert_eq!(summary.rows.iter().filter(|row| row.residual).count(), 10);
    }

    #[test]
    fn test_summary_display() {
        let device = Default::default();
        let config = MobileNetV2Config::new().with_multiplier(0.5).with_input_size(64);
        let model = config.init::<TestBackend>(&device).unwrap();

        let rendered = ModelSummary::of(&model, &config).to_string();
        assert!(rendered.contains("bottleneck_17"));
        assert!(rendered.contains("Total params:"));
    }
}

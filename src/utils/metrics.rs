//! Evaluation Metrics
//!
//! Confusion matrix with per-class precision/recall, and a running average
//! used for epoch loss reporting.

use serde::{Deserialize, Serialize};

/// Per-class precision, recall and F1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_name: String,
    pub support: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Class names, indexed by label
    pub class_names: Vec<String>,

    /// Matrix data (row = actual, column = predicted)
    /// Stored as a flat vector in row-major order
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(class_names: Vec<String>) -> Self {
        let n = class_names.len();
        Self {
            class_names,
            matrix: vec![0; n * n],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        let n = self.num_classes();
        if actual < n && predicted < n {
            self.matrix[actual * n + predicted] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        let n = self.num_classes();
        if actual < n && predicted < n {
            self.matrix[actual * n + predicted]
        } else {
            0
        }
    }

    /// Get the total count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Get the number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes()).map(|i| self.get(i, i)).sum()
    }

    /// Get overall accuracy
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Precision, recall and F1 for one class
    pub fn class_metrics(&self, class_idx: usize) -> ClassMetrics {
        let n = self.num_classes();
        let tp = self.get(class_idx, class_idx);
        let support: usize = (0..n).map(|col| self.get(class_idx, col)).sum();
        let predicted: usize = (0..n).map(|row| self.get(row, class_idx)).sum();

        let ratio = |a: usize, b: usize| if b > 0 { a as f64 / b as f64 } else { 0.0 };
        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        ClassMetrics {
            class_name: self.class_names.get(class_idx).cloned().unwrap_or_default(),
            support,
            precision,
            recall,
            f1_score,
        }
    }

    pub fn per_class(&self) -> Vec<ClassMetrics> {
        (0..self.num_classes()).map(|i| self.class_metrics(i)).collect()
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .class_names
            .iter()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0)
            .max(6);

        writeln!(f, "Confusion Matrix (rows=actual, cols=predicted):")?;
        write!(f, "{:>width$} ", "", width = width)?;
        for name in &self.class_names {
            write!(f, " {:>width$}", name, width = width)?;
        }
        writeln!(f)?;

        for (row, name) in self.class_names.iter().enumerate() {
            write!(f, "{:>width$} ", name, width = width)?;
            for col in 0..self.num_classes() {
                write!(f, " {:>width$}", self.get(row, col), width = width)?;
            }
            writeln!(f)?;
        }

        writeln!(f)?;
        for m in self.per_class() {
            writeln!(
                f,
                "{:>width$}  precision {:.4}  recall {:.4}  f1 {:.4}  support {}",
                m.class_name,
                m.precision,
                m.recall,
                m.f1_score,
                m.support,
                width = width
            )?;
        }
        write!(
            f,
            "Accuracy: {:.2}% ({}/{})",
            self.accuracy() * 100.0,
            self.correct(),
            self.total()
        )
    }
}

/// Running average for tracking metrics during training
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single value
    pub fn add(&mut self, value: f64) {
        self.add_weighted(value, 1);
    }

    /// Add a batch mean covering `count` samples
    pub fn add_weighted(&mut self, value: f64, count: usize) {
        self.sum += value * count as f64;
        self.count += count;
    }

    /// Get the current average
    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{i}")).collect()
    }

    #[test]
    fn test_confusion_matrix() {
        let predictions = [0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = [0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let mut cm = ConfusionMatrix::new(names(3));
        for (&pred, &actual) in predictions.iter().zip(&ground_truth) {
            cm.add(actual, pred);
        }

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 0.001);

        // Out-of-range labels are ignored
        cm.add(5, 0);
        assert_eq!(cm.total(), 10);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = [0, 0, 0, 1, 1];
        let ground_truth = [0, 0, 1, 1, 0];

        let mut cm = ConfusionMatrix::new(vec!["bad".into(), "good".into()]);
        for (&pred, &actual) in predictions.iter().zip(&ground_truth) {
            cm.add(actual, pred);
        }

        // Class 0: TP=2, FP=1, FN=1
        let class0 = cm.class_metrics(0);
        assert_eq!(class0.class_name, "bad");
        assert_eq!(class0.support, 3);
        assert!((class0.precision - 2.0 / 3.0).abs() < 0.001);
        assert!((class0.recall - 2.0 / 3.0).abs() < 0.001);
        assert!((class0.f1_score - 2.0 / 3.0).abs() < 0.001);

        let rendered = cm.to_string();
        assert!(rendered.contains("good"));
        assert!(rendered.contains("Accuracy: 60.00% (3/5)"));
    }

    #[test]
    fn test_empty_matrix() {
        let cm = ConfusionMatrix::new(names(2));
        assert_eq!(cm.accuracy(), 0.0);
        assert_eq!(cm.class_metrics(1).f1_score, 0.0);
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();

        avg.add(1.0);
        avg.add(2.0);
        avg.add(3.0);
        assert_eq!(avg.count(), 3);
        assert!((avg.average() - 2.0).abs() < 0.001);

        avg.reset();
        assert_eq!(avg.count(), 0);
        assert_eq!(avg.average(), 0.0);

        // A full batch of 4 at 1.0 and a short batch of 1 at 6.0
        avg.add_weighted(1.0, 4);
        avg.add_weighted(6.0, 1);
        assert!((avg.average() - 2.0).abs() < 1e-12);
    }
}

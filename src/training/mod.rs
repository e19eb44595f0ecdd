//! Training module
//!
//! This module provides:
//! - The run configuration with TOML loading
//! - Epoch-level learning rate schedules and per-iteration time decay
//! - Best-model checkpointing on validation accuracy
//! - The step-based fit loop

pub mod checkpoint;
pub mod config;
pub mod scheduler;
pub mod trainer;

// Re-export main types for convenience
pub use checkpoint::{BestCheckpoint, CheckpointMetadata, CheckpointNamer, ModelInfo};
pub use config::TrainingConfig;
pub use scheduler::{LrSchedule, Milestone, TimeDecay};
pub use trainer::{fit, EpochMetrics, Trainer, TrainingHistory};

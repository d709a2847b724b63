//! Training infrastructure for grid surrogates.
//!
//! This module provides:
//! - `GridTrainer`: main training orchestrator
//! - Tensor batches built from codec rows
//! - Training metrics and logging
//! - Optimizer configuration and training state
//! - Checkpoint save/load for training resumption

mod batch;
mod checkpoint;
mod metrics;
mod optimizer;
mod trainer;

pub use batch::{rows_to_tensor, tensor_to_vec, TensorBatch};
pub use checkpoint::{
    checkpoint_dir, checkpoint_exists, find_latest_checkpoint, load_checkpoint, save_checkpoint,
    CheckpointMetadata,
};
pub use metrics::{MetricsTracker, TrainMetrics};
pub use optimizer::{OptimizerConfig, TrainingState};
pub use trainer::GridTrainer;

//! Configuration types for neural_volt.
//!
//! Burn-style configuration structs for the dense transform, the data loader
//! and the training run. The optimizer configuration lives with the training
//! state and is re-exported here.

mod network;
mod training;

pub use crate::training::OptimizerConfig;
pub use network::DenseTransformConfig;
pub use training::{LoaderConfig, TrainingConfig};

//! # neural_volt
//!
//! Dense neural surrogates of fixed-topology power grids, trained with Burn.
//!
//! A surrogate maps the normalized input features of a grid (loads,
//! generator set points, ...) to simulated results (bus voltages, line
//! flows, ...). It is trained against a simulator backend that provides the
//! ground truth for every batch.
//!
//! ## Features
//!
//! - **Dense transform**: MLP over the codec's flat vectors, weights passed explicitly
//! - **Data loader**: worker pool with a bounded queue and seeded, order-stable batches
//! - **Trainer**: Adam with warmup, MSE on post-processed predictions, checkpoints
//! - **Inference**: `GridSurrogate` predicts and writes results back into grids
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use burn::backend::{Autodiff, NdArray};
//! use neural_volt::prelude::*;
//! use volt_io::DcPowerFlowBackend;
//!
//! type MyBackend = Autodiff<NdArray>;
//!
//! let input = FeatureNames::new().with_class("load", ["p_mw", "q_mvar"]);
//! let output = FeatureNames::new().with_class("bus", ["res_vm_pu"]);
//! let config = TrainingConfig::new(input, output).with_epochs(20);
//!
//! let device = Default::default();
//! let mut trainer = GridTrainer::<MyBackend, _>::from_dataset(
//!     config,
//!     Arc::new(DcPowerFlowBackend::new()),
//!     "data/four_bus".as_ref(),
//!     &device,
//! )?;
//! let history = trainer.train()?;
//! trainer.into_surrogate().save("models/four_bus".as_ref())?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! volt_core (pipeline, Backend trait)
//!     │
//!     ├──────────────────┐
//!     ▼                  ▼
//! volt_io            neural_volt
//! (grids, DC flow)   (burn: network, training)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod nn;
pub mod training;

// Re-export key types for convenience
pub use config::{DenseTransformConfig, LoaderConfig, OptimizerConfig, TrainingConfig};
pub use data::DataLoader;
pub use error::{NeuralVoltError, Result};
pub use inference::GridSurrogate;
pub use nn::{DenseTransform, DenseWeights};
pub use training::{GridTrainer, TrainMetrics, TrainingState};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::*;
    pub use crate::data::DataLoader;
    pub use crate::error::{NeuralVoltError, Result};
    pub use crate::inference::GridSurrogate;
    pub use crate::nn::{DenseTransform, DenseWeights};
    pub use crate::training::{GridTrainer, TrainMetrics};
    pub use volt_core::{FeatureNames, PostProcessor, TransformSpec};
}

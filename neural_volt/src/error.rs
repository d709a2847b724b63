//! Error types for neural_volt.

use thiserror::Error;
use volt_core::VoltCoreError;
use volt_io::VoltIoError;

/// Errors raised while building, training or running a surrogate.
#[derive(Error, Debug)]
pub enum NeuralVoltError {
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Tensor shape mismatch.
    #[error("tensor shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// Training error.
    #[error("training error: {message}")]
    TrainingError {
        /// Description of the error.
        message: String,
    },

    /// A loader worker failed or disappeared.
    #[error("data loader error: {message}")]
    LoaderError {
        /// Description of the error.
        message: String,
    },

    /// Weights could not be recorded or restored.
    #[error("checkpoint error: {message}")]
    CheckpointError {
        /// Description of the error.
        message: String,
    },

    /// Pipeline error from volt_core.
    #[error(transparent)]
    Core(#[from] VoltCoreError),

    /// Storage error from volt_io.
    #[error(transparent)]
    Io(#[from] VoltIoError),

    /// Plain filesystem error.
    #[error("I/O error: {0}")]
    StdIo(#[from] std::io::Error),

    /// Invalid or corrupted data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl NeuralVoltError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn checkpoint(message: impl ToString) -> Self {
        Self::CheckpointError {
            message: message.to_string(),
        }
    }
}

/// Result type for neural_volt operations.
pub type Result<T> = std::result::Result<T, NeuralVoltError>;

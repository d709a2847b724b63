//! Error types for the grid sample pipeline.

use thiserror::Error;

/// Errors raised by feature extraction, normalization, collation and encoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoltCoreError {
    /// Two samples advertise different feature sets for the same class.
    #[error(
        "feature set mismatch for class '{class}': sample {sample} advertises {got:?}, expected {expected:?}"
    )]
    FeatureSetMismatch {
        /// Object class.
        class: String,
        /// Index of the offending sample in the collated list.
        sample: usize,
        /// Feature set of the first sample.
        expected: Vec<String>,
        /// Feature set of the offending sample.
        got: Vec<String>,
    },

    /// A (class, feature) pair is not known to the component.
    #[error("unknown feature '{feature}' for class '{class}'")]
    UnknownFeature {
        /// Object class.
        class: String,
        /// Feature name.
        feature: String,
    },

    /// Object counts of a batch differ from the recorded schema.
    #[error("schema mismatch for class '{class}': expected {expected} objects, got {got}")]
    SchemaMismatch {
        /// Object class.
        class: String,
        /// Count recorded in the schema.
        expected: usize,
        /// Count found in the batch.
        got: usize,
    },

    /// A flat vector has the wrong length.
    #[error("vector length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// A feature column disagrees with the object count of its class.
    #[error("column '{class}.{feature}' has {got} values for {expected} objects")]
    ColumnLength {
        /// Object class.
        class: String,
        /// Feature name.
        feature: String,
        /// Number of objects of the class.
        expected: usize,
        /// Number of values in the column.
        got: usize,
    },

    /// Statistics were requested from an empty set of samples.
    #[error("cannot fit statistics on an empty sample set")]
    EmptySampleSet,

    /// A transform without inverse was asked to invert.
    #[error("transform '{kind}' on '{class}.{feature}' has no inverse")]
    InverseUndefined {
        /// Object class.
        class: String,
        /// Feature name.
        feature: String,
        /// Transform kind.
        kind: String,
    },

    /// A value lies outside the range of the transform being inverted.
    #[error("value {value} of '{class}.{feature}' is outside the range of '{kind}'")]
    InverseOutOfDomain {
        /// Object class.
        class: String,
        /// Feature name.
        feature: String,
        /// Transform kind.
        kind: String,
        /// Offending value.
        value: f32,
    },

    /// Failure reported by a simulation backend.
    #[error("backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl VoltCoreError {
    /// Wrap a backend failure message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Shorthand for an unknown (class, feature) pair.
    pub fn unknown_feature(class: &str, feature: &str) -> Self {
        Self::UnknownFeature {
            class: class.to_string(),
            feature: feature.to_string(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, VoltCoreError>;

//! Error types for volt_io operations.
//!
//! Covers file access, grid case parsing and structural problems of a grid.

use std::path::PathBuf;

use thiserror::Error;
use volt_core::VoltCoreError;

/// Errors that can occur while reading, writing or simulating grid cases.
#[derive(Error, Debug)]
pub enum VoltIoError {
    /// Filesystem failure.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON document.
    #[error("malformed JSON in {path:?}: {source}")]
    Json {
        /// Path being parsed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The path does not name a directory holding valid files.
    #[error("no valid file with extension {extensions:?} in {dir:?}")]
    NoValidFiles {
        /// Scanned directory.
        dir: PathBuf,
        /// Accepted extensions.
        extensions: Vec<String>,
    },

    /// Object class not present in the grid format.
    #[error("unknown object class '{class}'")]
    UnknownClass {
        /// Requested class.
        class: String,
    },

    /// Feature not present for the class.
    #[error("unknown feature '{feature}' for class '{class}'")]
    UnknownFeature {
        /// Object class.
        class: String,
        /// Requested feature.
        feature: String,
    },

    /// Column length differs from the table length.
    #[error("column '{class}.{feature}' has {got} values for {expected} objects")]
    ColumnLength {
        /// Object class.
        class: String,
        /// Feature name.
        feature: String,
        /// Number of objects.
        expected: usize,
        /// Number of values written.
        got: usize,
    },

    /// An object refers to a bus index that does not exist.
    #[error("{class} {index} refers to bus {bus}, but the grid has {buses} buses")]
    DanglingBus {
        /// Object class.
        class: String,
        /// Object index.
        index: usize,
        /// Referenced bus.
        bus: usize,
        /// Number of buses.
        buses: usize,
    },

    /// Error from the pipeline core.
    #[error(transparent)]
    Core(#[from] VoltCoreError),
}

impl VoltIoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

impl From<VoltIoError> for VoltCoreError {
    fn from(err: VoltIoError) -> Self {
        match err {
            VoltIoError::Core(inner) => inner,
            VoltIoError::UnknownFeature { class, feature } => {
                VoltCoreError::UnknownFeature { class, feature }
            }
            VoltIoError::UnknownClass { class } => VoltCoreError::UnknownFeature {
                class,
                feature: String::new(),
            },
            VoltIoError::ColumnLength {
                class,
                feature,
                expected,
                got,
            } => VoltCoreError::ColumnLength {
                class,
                feature,
                expected,
                got,
            },
            other => VoltCoreError::backend(other.to_string()),
        }
    }
}

/// Result type for volt_io operations.
pub type Result<T> = std::result::Result<T, VoltIoError>;

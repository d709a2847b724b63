//! # volt_core
//!
//! Pipeline stages shared by every neural surrogate of a fixed-topology
//! power grid:
//!
//! - [`Backend`]: the seam to a grid simulator (load, run, extract, write back)
//! - [`Normalizer`]: per-feature statistics fitted once on a file sample
//! - [`SampleAdapter`]: load + extract + normalize for one dataset file
//! - [`collate`]: merge per-sample columns into a [`Batch`] with an [`AddressTable`]
//! - [`VectorCodec`]: batch to flat vector and back, for one fixed schema
//! - [`PostProcessor`]: per-feature transform chains applied after decoding
//!
//! This crate holds no tensor code. The dense network and its training loop
//! live in `neural_volt`, the concrete simulator in `volt_io`.

#![warn(missing_docs)]

pub mod adapter;
pub mod codec;
pub mod collate;
pub mod error;
pub mod normalizer;
pub mod postprocess;
pub mod traits;
pub mod types;

pub use adapter::{AdaptedSample, SampleAdapter};
pub use codec::{Schema, Segment, VectorCodec};
pub use collate::{collate, collate_graphs, GraphBatch};
pub use error::{Result, VoltCoreError};
pub use normalizer::{
    select_sample, FeatureStatistic, NormalizationMethod, Normalizer, NormalizerConfig,
    PooledValues,
};
pub use postprocess::{PostProcessor, TransformChains, TransformSpec};
pub use traits::Backend;
pub use types::{
    AddressTable, Batch, ClassColumns, ClassCounts, FeatureMap, FeatureNames, ObjectAddress,
    SampleFeatures,
};

//! Neural network modules of the surrogate.
//!
//! - [`DenseTransform`]: the dense network over codec vectors
//! - Tensor versions of the post-processing chains

pub mod dense;
pub mod postprocess;

pub use dense::{DenseTransform, DenseWeights};
pub use postprocess::{apply_chain, apply_transform, postprocess_flat};

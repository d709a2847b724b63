//! Sample loading for training and evaluation.

mod loader;

pub use loader::{DataLoader, EpochBatches};

//! Checkpoint save/load for training runs.
//!
//! A checkpoint is a directory holding the recorded weights (`weights.mpk`)
//! and a `metadata.json` describing progress and network shape.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::CompactRecorder;
use serde::{Deserialize, Serialize};
use volt_io::persist::{load_json, save_json};

use crate::error::{NeuralVoltError, Result};
use crate::nn::{DenseTransform, DenseWeights};

const METADATA_FILE: &str = "metadata.json";
const WEIGHTS_STEM: &str = "weights";
const WEIGHTS_FILE: &str = "weights.mpk";

/// Checkpoint metadata stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Completed epochs.
    pub epoch: usize,
    /// Total training steps.
    pub total_steps: usize,
    /// Best loss achieved (`f32::MAX` before the first step).
    pub best_loss: f32,
    /// Moving average of the loss.
    pub avg_loss: f32,
    /// Encoded input length.
    pub input_len: usize,
    /// Output length.
    pub output_len: usize,
    /// Hidden widths.
    pub hidden_dimensions: Vec<usize>,
    /// Checkpoint version for compatibility.
    pub version: u32,
}

impl CheckpointMetadata {
    /// Current checkpoint format version.
    pub const VERSION: u32 = 1;

    /// Create metadata from training progress and network shape.
    pub fn new(
        epoch: usize,
        total_steps: usize,
        best_loss: f32,
        avg_loss: f32,
        transform: &DenseTransform,
    ) -> Self {
        // JSON has no infinity
        let finite = |x: f32| if x.is_finite() { x } else { f32::MAX };
        Self {
            epoch,
            total_steps,
            best_loss: finite(best_loss),
            avg_loss: finite(avg_loss),
            input_len: transform.input_len(),
            output_len: transform.output_len(),
            hidden_dimensions: transform.hidden_dimensions().to_vec(),
            version: Self::VERSION,
        }
    }

    fn check_shape(&self, transform: &DenseTransform) -> Result<()> {
        let shape = |input: usize, hidden: &[usize], output: usize| {
            let mut v = vec![input];
            v.extend_from_slice(hidden);
            v.push(output);
            v
        };
        let expected = shape(
            transform.input_len(),
            transform.hidden_dimensions(),
            transform.output_len(),
        );
        let got = shape(self.input_len, &self.hidden_dimensions, self.output_len);
        if expected != got {
            return Err(NeuralVoltError::ShapeMismatch { expected, got });
        }
        Ok(())
    }
}

/// Directory of the checkpoint taken after `epoch` epochs.
pub fn checkpoint_dir(base_dir: &Path, epoch: usize) -> PathBuf {
    base_dir.join(format!("checkpoint_{epoch}"))
}

/// Save weights and metadata into `dir`.
pub fn save_checkpoint<B: Backend>(
    dir: &Path,
    weights: &DenseWeights<B>,
    metadata: &CheckpointMetadata,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    weights
        .clone()
        .save_file(dir.join(WEIGHTS_STEM), &CompactRecorder::new())
        .map_err(NeuralVoltError::checkpoint)?;
    save_json(metadata, &dir.join(METADATA_FILE))?;

    log::info!(
        "Saved checkpoint to {:?} (epoch {}, step {})",
        dir,
        metadata.epoch,
        metadata.total_steps
    );
    Ok(())
}

/// Load the checkpoint in `dir` into weights shaped by `transform`.
///
/// Fails with a shape mismatch when the checkpoint was written for another
/// network shape.
pub fn load_checkpoint<B: Backend>(
    dir: &Path,
    transform: &DenseTransform,
    device: &B::Device,
) -> Result<(DenseWeights<B>, CheckpointMetadata)> {
    let metadata: CheckpointMetadata = load_json(&dir.join(METADATA_FILE))?;
    if metadata.version != CheckpointMetadata::VERSION {
        return Err(NeuralVoltError::InvalidData(format!(
            "unsupported checkpoint version {}",
            metadata.version
        )));
    }
    metadata.check_shape(transform)?;

    let weights = transform
        .init::<B>(device)
        .load_file(dir.join(WEIGHTS_STEM), &CompactRecorder::new(), device)
        .map_err(NeuralVoltError::checkpoint)?;

    log::info!("Loaded checkpoint from {:?} (epoch {})", dir, metadata.epoch);
    Ok((weights, metadata))
}

/// Check if a complete checkpoint exists at the given path.
pub fn checkpoint_exists(dir: &Path) -> bool {
    dir.join(METADATA_FILE).is_file() && dir.join(WEIGHTS_FILE).is_file()
}

/// Get the latest checkpoint from a series of numbered checkpoints.
///
/// Looks for directories named `checkpoint_N` where N is an epoch number.
pub fn find_latest_checkpoint(base_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(base_dir).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && checkpoint_exists(path))
        .filter_map(|path| {
            let epoch = path
                .file_name()?
                .to_str()?
                .strip_prefix("checkpoint_")?
                .parse::<usize>()
                .ok()?;
            Some((epoch, path))
        })
        .max_by_key(|(epoch, _)| *epoch)
        .map(|(_, path)| path)
}

//! Tensor batches built from encoded rows.

use burn::prelude::*;
use volt_core::{Batch, VectorCodec};

use crate::error::{NeuralVoltError, Result};

/// Stack per-sample rows of equal width into a `[n, width]` tensor.
pub fn rows_to_tensor<B: Backend>(
    rows: Vec<Vec<f32>>,
    width: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let n = rows.len();
    let mut flat = Vec::with_capacity(n * width);
    for row in rows {
        if row.len() != width {
            return Err(NeuralVoltError::ShapeMismatch {
                expected: vec![n, width],
                got: vec![n, row.len()],
            });
        }
        flat.extend(row);
    }
    Ok(Tensor::from_data(TensorData::new(flat, [n, width]), device))
}

/// Row-major values of a float tensor.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| NeuralVoltError::InvalidData(format!("{e:?}")))
}

/// Encoded network inputs of a batch, one row per sample.
#[derive(Debug, Clone)]
pub struct TensorBatch<B: Backend> {
    /// Network inputs: [n, input_len]
    pub inputs: Tensor<B, 2>,
    /// Ground truth in output layout: [n, output_len], when known.
    pub targets: Option<Tensor<B, 2>>,
}

impl<B: Backend> TensorBatch<B> {
    /// Encode the inputs of `batch`.
    pub fn from_inputs(codec: &VectorCodec, batch: &Batch, device: &B::Device) -> Result<Self> {
        let inputs = rows_to_tensor(codec.encode_rows(batch)?, codec.input_len(), device)?;
        Ok(Self {
            inputs,
            targets: None,
        })
    }

    /// Attach ground truth taken from `truth`, which must hold the output
    /// features of the same samples.
    pub fn with_targets(mut self, codec: &VectorCodec, truth: &Batch, device: &B::Device) -> Result<Self> {
        let targets = rows_to_tensor(codec.encode_target_rows(truth)?, codec.output_len(), device)?;
        let [n_in, _] = self.inputs.dims();
        let [n_out, width] = targets.dims();
        if n_in != n_out {
            return Err(NeuralVoltError::ShapeMismatch {
                expected: vec![n_in, width],
                got: vec![n_out, width],
            });
        }
        self.targets = Some(targets);
        Ok(self)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.inputs.dims()[0]
    }

    /// Whether the batch holds no sample.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

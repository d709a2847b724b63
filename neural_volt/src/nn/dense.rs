//! Dense transform between encoded input and output vectors.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use volt_core::VectorCodec;

use crate::config::DenseTransformConfig;
use crate::error::{NeuralVoltError, Result};

/// Parameters of a [`DenseTransform`].
///
/// Opaque to the rest of the pipeline: created by [`DenseTransform::init`],
/// replaced wholesale by every optimizer step and by checkpoint loading.
#[derive(Module, Debug)]
pub struct DenseWeights<B: Backend> {
    /// Hidden layers.
    hidden: Vec<Linear<B>>,
    /// Linear output layer.
    output: Linear<B>,
    /// Activation between layers.
    activation: Relu,
}

impl<B: Backend> DenseWeights<B> {
    /// Number of hidden layers.
    pub fn num_hidden(&self) -> usize {
        self.hidden.len()
    }
}

/// Shape of a dense network: `[n, input_len] -> [n, output_len]` through
/// `hidden_dimensions`, ReLU between layers, linear output.
///
/// The transform holds no parameters. Weights are passed to
/// [`DenseTransform::forward`] explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseTransform {
    input_len: usize,
    output_len: usize,
    hidden_dimensions: Vec<usize>,
}

impl DenseTransform {
    /// Create a transform of explicit widths.
    pub fn new(input_len: usize, output_len: usize, config: &DenseTransformConfig) -> Result<Self> {
        config.validate().map_err(NeuralVoltError::config)?;
        if input_len == 0 || output_len == 0 {
            return Err(NeuralVoltError::config(format!(
                "dense transform needs positive widths, got {input_len} -> {output_len}"
            )));
        }
        Ok(Self {
            input_len,
            output_len,
            hidden_dimensions: config.hidden_dimensions.clone(),
        })
    }

    /// Create a transform sized by a codec's input and output lengths.
    pub fn from_codec(codec: &VectorCodec, config: &DenseTransformConfig) -> Result<Self> {
        Self::new(codec.input_len(), codec.output_len(), config)
    }

    /// Encoded input length.
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Output length.
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Hidden widths.
    pub fn hidden_dimensions(&self) -> &[usize] {
        &self.hidden_dimensions
    }

    /// Fresh weights with burn's default `Linear` initialization.
    ///
    /// Call `B::seed` beforehand for reproducible weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseWeights<B> {
        let mut hidden = Vec::with_capacity(self.hidden_dimensions.len());
        let mut in_dim = self.input_len;
        for &out_dim in &self.hidden_dimensions {
            hidden.push(LinearConfig::new(in_dim, out_dim).init(device));
            in_dim = out_dim;
        }
        let output = LinearConfig::new(in_dim, self.output_len).init(device);

        DenseWeights {
            hidden,
            output,
            activation: Relu::new(),
        }
    }

    /// Forward pass.
    ///
    /// Input shape: [n, input_len]
    /// Output shape: [n, output_len]
    pub fn forward<B: Backend>(
        &self,
        weights: &DenseWeights<B>,
        input: Tensor<B, 2>,
    ) -> Result<Tensor<B, 2>> {
        let [n, width] = input.dims();
        if width != self.input_len {
            return Err(NeuralVoltError::ShapeMismatch {
                expected: vec![n, self.input_len],
                got: vec![n, width],
            });
        }
        if weights.hidden.len() != self.hidden_dimensions.len() {
            return Err(NeuralVoltError::ShapeMismatch {
                expected: self.hidden_dimensions.clone(),
                got: weights.hidden.iter().map(|l| l.weight.dims()[1]).collect(),
            });
        }

        let mut x = input;
        for layer in &weights.hidden {
            x = layer.forward(x);
            x = weights.activation.forward(x);
        }
        Ok(weights.output.forward(x))
    }
}

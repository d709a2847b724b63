//! Inference with a trained surrogate.
//!
//! A [`GridSurrogate`] bundles everything a prediction needs: the fitted
//! normalizer, the codec, the post-processing chains and the weights. It can
//! be written to a directory and restored without the training data.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use burn::module::Module;
use burn::prelude::*;
use burn::record::CompactRecorder;
use serde::{Deserialize, Serialize};
use volt_core::{
    collate, Backend as GridBackend, Batch, FeatureMap, FeatureNames, GraphBatch, Normalizer,
    PostProcessor, Schema, VectorCodec,
};
use volt_io::persist::{load_json, save_json};
use volt_io::{load_normalizer, load_postprocessor, save_normalizer, save_postprocessor};

use crate::config::DenseTransformConfig;
use crate::error::{NeuralVoltError, Result};
use crate::nn::{postprocess_flat, DenseTransform, DenseWeights};
use crate::training::{rows_to_tensor, tensor_to_vec};

const MANIFEST_FILE: &str = "surrogate.json";
const NORMALIZER_FILE: &str = "normalizer.json";
const POSTPROCESS_FILE: &str = "postprocess.json";
const WEIGHTS_STEM: &str = "weights";

/// Shape information needed to rebuild codec and transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SurrogateManifest {
    schema: Schema,
    input_feature_names: FeatureNames,
    output_feature_names: FeatureNames,
    hidden_dimensions: Vec<usize>,
}

/// A trained surrogate, ready to predict the outputs of unsimulated grids.
pub struct GridSurrogate<B: Backend> {
    normalizer: Arc<Normalizer>,
    codec: VectorCodec,
    post: PostProcessor,
    transform: DenseTransform,
    weights: DenseWeights<B>,
    device: B::Device,
}

impl<B: Backend> GridSurrogate<B> {
    /// Bundle trained parts.
    pub fn new(
        normalizer: Arc<Normalizer>,
        codec: VectorCodec,
        post: PostProcessor,
        transform: DenseTransform,
        weights: DenseWeights<B>,
        device: B::Device,
    ) -> Self {
        Self {
            normalizer,
            codec,
            post,
            transform,
            weights,
            device,
        }
    }

    /// Codec of the surrogate.
    pub fn codec(&self) -> &VectorCodec {
        &self.codec
    }

    /// Normalizer applied to raw inputs.
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Post-processing chains.
    pub fn postprocessor(&self) -> &PostProcessor {
        &self.post
    }

    /// Weights.
    pub fn weights(&self) -> &DenseWeights<B> {
        &self.weights
    }

    /// Extract, normalize and collate the inputs of raw graphs.
    pub fn prepare<Bk: GridBackend>(&self, backend: &Bk, graphs: &[Bk::Graph]) -> Result<Batch> {
        let extraction = self
            .codec
            .input_names()
            .union(&self.codec.output_names().classes_only());
        let samples = graphs
            .iter()
            .map(|graph| {
                let raw = backend.get_features(graph, &extraction)?;
                self.normalizer.normalize_sample(raw)
            })
            .collect::<volt_core::Result<Vec<_>>>()?;
        Ok(collate(&samples)?)
    }

    /// Decoded and post-processed outputs of every sample of a normalized
    /// batch, in sample order.
    pub fn predict_batch(&self, batch: &Batch) -> Result<Vec<FeatureMap>> {
        let inputs = rows_to_tensor::<B>(self.codec.encode_rows(batch)?, self.codec.input_len(), &self.device)?;
        let outputs = self.transform.forward(&self.weights, inputs)?;
        let outputs = postprocess_flat(&self.post, self.codec.output_layout(), outputs);
        Ok(self.codec.decode_rows(&tensor_to_vec(outputs)?)?)
    }

    /// Predict the outputs of a loader batch.
    pub fn predict<G>(&self, batch: &GraphBatch<G>) -> Result<Vec<FeatureMap>> {
        self.predict_batch(&batch.batch)
    }

    /// Write per-sample predictions into the graphs through the backend.
    pub fn write_predictions<Bk: GridBackend>(
        &self,
        backend: &Bk,
        graphs: &mut [Bk::Graph],
        predictions: &[FeatureMap],
    ) -> Result<()> {
        if graphs.len() != predictions.len() {
            return Err(NeuralVoltError::ShapeMismatch {
                expected: vec![graphs.len()],
                got: vec![predictions.len()],
            });
        }
        for (graph, values) in graphs.iter_mut().zip(predictions) {
            backend.set_features(graph, values)?;
        }
        Ok(())
    }

    /// Predict the outputs of raw graphs and write them back in place.
    pub fn predict_graphs<Bk: GridBackend>(&self, backend: &Bk, graphs: &mut [Bk::Graph]) -> Result<()> {
        let batch = self.prepare(backend, graphs)?;
        let predictions = self.predict_batch(&batch)?;
        self.write_predictions(backend, graphs, &predictions)
    }

    /// Write the surrogate into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let manifest = SurrogateManifest {
            schema: self.codec.schema().clone(),
            input_feature_names: self.codec.input_names().clone(),
            output_feature_names: self.codec.output_names().clone(),
            hidden_dimensions: self.transform.hidden_dimensions().to_vec(),
        };
        save_json(&manifest, &dir.join(MANIFEST_FILE))?;
        save_normalizer(&self.normalizer, &dir.join(NORMALIZER_FILE))?;
        save_postprocessor(&self.post, &dir.join(POSTPROCESS_FILE))?;
        self.weights
            .clone()
            .save_file(dir.join(WEIGHTS_STEM), &CompactRecorder::new())
            .map_err(NeuralVoltError::checkpoint)?;
        log::info!("Saved surrogate to {:?}", dir);
        Ok(())
    }

    /// Restore a surrogate written by [`GridSurrogate::save`].
    pub fn load(dir: &Path, device: &B::Device) -> Result<Self> {
        let manifest: SurrogateManifest = load_json(&dir.join(MANIFEST_FILE))?;
        let codec = VectorCodec::from_schema(
            manifest.schema,
            &manifest.input_feature_names,
            &manifest.output_feature_names,
        )?;
        let network = DenseTransformConfig::new().with_hidden_dimensions(manifest.hidden_dimensions);
        let transform = DenseTransform::from_codec(&codec, &network)?;
        let weights = transform
            .init::<B>(device)
            .load_file(dir.join(WEIGHTS_STEM), &CompactRecorder::new(), device)
            .map_err(NeuralVoltError::checkpoint)?;

        Ok(Self {
            normalizer: Arc::new(load_normalizer(&dir.join(NORMALIZER_FILE))?),
            codec,
            post: load_postprocessor(&dir.join(POSTPROCESS_FILE))?,
            transform,
            weights,
            device: device.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use tempfile::TempDir;
    use volt_core::{ClassCounts, NormalizerConfig, PooledValues, TransformSpec};
    use volt_io::{four_bus_case, DcPowerFlowBackend, PowerGrid};

    type TestBackend = NdArray;

    fn surrogate(post: PostProcessor) -> GridSurrogate<TestBackend> {
        let device = Default::default();
        let input = FeatureNames::new().with_class("load", ["p_mw", "q_mvar"]);
        let output = FeatureNames::new().with_class("bus", ["res_vm_pu", "res_va_degree"]);
        let mut counts = ClassCounts::new();
        counts.insert("load".into(), 2);
        counts.insert("bus".into(), 4);
        let codec = VectorCodec::from_schema(Schema::new(counts), &input, &output).unwrap();
        let transform = DenseTransform::from_codec(&codec, &DenseTransformConfig::new().with_hidden_dimensions(vec![8])).unwrap();
        let normalizer = Normalizer::fit(&PooledValues::new(), &input, &NormalizerConfig::default());
        let weights = transform.init::<TestBackend>(&device);
        GridSurrogate::new(Arc::new(normalizer), codec, post, transform, weights, device)
    }

    #[test]
    fn test_predict_graphs_writes_every_bus() {
        let backend = DcPowerFlowBackend::new();
        let tanh = PostProcessor::identity().with_chain(
            "bus",
            "res_vm_pu",
            vec![TransformSpec::Tanh, TransformSpec::affine(1.0, 0.05)],
        );
        let model = surrogate(tanh);

        let mut graphs = vec![four_bus_case(), four_bus_case(), four_bus_case()];
        model.predict_graphs(&backend, &mut graphs).unwrap();
        for grid in &graphs {
            assert!(grid.bus.iter().all(|b| (0.95..=1.05).contains(&b.res_vm_pu)));
        }
        // Identical inputs give identical predictions.
        assert_eq!(graphs[0].bus, graphs[2].bus);
    }

    #[test]
    fn test_prepare_rejects_other_topology() {
        let backend = DcPowerFlowBackend::new();
        let model = surrogate(PostProcessor::identity());
        let mut grid: PowerGrid = four_bus_case();
        grid.load.pop();
        let batch = model.prepare(&backend, &[grid]).unwrap();
        assert!(model.predict_batch(&batch).is_err());
    }

    #[test]
    fn test_write_predictions_checks_length() {
        let backend = DcPowerFlowBackend::new();
        let model = surrogate(PostProcessor::identity());
        let mut graphs = vec![four_bus_case()];
        assert!(matches!(
            model.write_predictions(&backend, &mut graphs, &[]),
            Err(NeuralVoltError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let backend = DcPowerFlowBackend::new();
        let model = surrogate(PostProcessor::identity().with_chain(
            "bus",
            "res_va_degree",
            vec![TransformSpec::affine(0.0, 10.0)],
        ));
        model.save(dir.path()).unwrap();
        let restored = GridSurrogate::<TestBackend>::load(dir.path(), &Default::default()).unwrap();
        assert_eq!(restored.codec(), model.codec());
        assert_eq!(restored.postprocessor(), model.postprocessor());

        let batch = model.prepare(&backend, &[four_bus_case()]).unwrap();
        let a = model.predict_batch(&batch).unwrap();
        let b = restored.predict_batch(&batch).unwrap();
        let (a, b) = (&a[0]["bus"]["res_va_degree"], &b[0]["bus"]["res_va_degree"]);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 0.1);
        }
    }
}

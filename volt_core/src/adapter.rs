//! Turning one dataset file into a normalized sample.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::normalizer::Normalizer;
use crate::traits::Backend;
use crate::types::{FeatureNames, SampleFeatures};

/// Normalized input features of one sample together with its raw graph.
#[derive(Debug)]
pub struct AdaptedSample<G> {
    /// Normalized input features and per-class object counts.
    pub features: SampleFeatures,
    /// Raw object graph, still unsimulated.
    pub graph: G,
}

/// Loads a sample, extracts its input features and normalizes them.
///
/// Object counts are extracted for every input and output class, so that
/// output-only classes still appear in the address table of collated batches.
pub struct SampleAdapter<B: Backend> {
    backend: Arc<B>,
    normalizer: Arc<Normalizer>,
    input_names: FeatureNames,
    extraction: FeatureNames,
}

impl<B: Backend> SampleAdapter<B> {
    /// Create an adapter sharing a backend and a fitted normalizer.
    pub fn new(
        backend: Arc<B>,
        normalizer: Arc<Normalizer>,
        input_names: FeatureNames,
        output_names: &FeatureNames,
    ) -> Self {
        let extraction = input_names.union(&output_names.classes_only());
        Self {
            backend,
            normalizer,
            input_names,
            extraction,
        }
    }

    /// Load and adapt one file.
    pub fn adapt(&self, path: &Path) -> Result<AdaptedSample<B::Graph>> {
        let graph = self.backend.load(path)?;
        let raw = self.backend.get_features(&graph, &self.extraction)?;
        let features = self.normalizer.normalize_sample(raw)?;
        Ok(AdaptedSample { features, graph })
    }

    /// Shared backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Shared normalizer.
    pub fn normalizer(&self) -> &Arc<Normalizer> {
        &self.normalizer
    }

    /// Input feature names.
    pub fn input_names(&self) -> &FeatureNames {
        &self.input_names
    }
}

//! The simulation backend seam.
//!
//! Everything in this crate talks to a grid simulator through [`Backend`].
//! Implementations live downstream (see `volt_io` for a DC power-flow one).

use std::path::Path;

use crate::collate::collate;
use crate::error::{Result, VoltCoreError};
use crate::types::{Batch, FeatureMap, FeatureNames, SampleFeatures};

/// A grid simulator that loads object graphs from files, runs them and
/// exposes their objects as named feature columns.
///
/// Implementations are shared read-only across loader workers, so they must
/// be `Send + Sync`; graphs move between threads and must be `Send`.
pub trait Backend: Send + Sync {
    /// In-memory object graph of one grid sample.
    type Graph: Send;

    /// File extensions (without dot) this backend can load.
    fn valid_extensions(&self) -> &[&'static str];

    /// Every (class, feature) pair the backend can extract or write.
    fn valid_feature_names(&self) -> FeatureNames;

    /// Load one grid file.
    fn load(&self, path: &Path) -> Result<Self::Graph>;

    /// Run the simulation on one graph, storing results in place.
    ///
    /// A simulation that does not converge is not an error; results are left
    /// in whatever state the simulator reports.
    fn run_network(&self, graph: &mut Self::Graph) -> Result<()>;

    /// Extract the named features of one graph.
    ///
    /// The returned counts cover every class in `names`, including classes
    /// with an empty feature list.
    fn get_features(&self, graph: &Self::Graph, names: &FeatureNames) -> Result<SampleFeatures>;

    /// Write feature values back into the objects of one graph.
    fn set_features(&self, graph: &mut Self::Graph, values: &FeatureMap) -> Result<()>;

    /// Run the simulation on every graph of a batch.
    fn run_batch(&self, graphs: &mut [Self::Graph]) -> Result<()> {
        for graph in graphs.iter_mut() {
            self.run_network(graph)?;
        }
        Ok(())
    }

    /// Extract the named features of several graphs as one collated batch.
    fn get_feature_batch(&self, graphs: &[Self::Graph], names: &FeatureNames) -> Result<Batch> {
        let samples = graphs
            .iter()
            .map(|graph| self.get_features(graph, names))
            .collect::<Result<Vec<_>>>()?;
        collate(&samples)
    }

    /// Write a collated batch back into its graphs, sample by sample.
    fn set_feature_batch(&self, graphs: &mut [Self::Graph], batch: &Batch) -> Result<()> {
        if graphs.len() != batch.num_samples() {
            return Err(VoltCoreError::LengthMismatch {
                expected: batch.num_samples(),
                got: graphs.len(),
            });
        }
        for (graph, sample) in graphs.iter_mut().zip(batch.split()) {
            self.set_features(graph, &sample.features)?;
        }
        Ok(())
    }

    /// Reject any (class, feature) pair the backend does not know.
    fn check_feature_names(&self, names: &FeatureNames) -> Result<()> {
        let valid = self.valid_feature_names();
        for (class, features) in names.iter() {
            if !valid.has_class(class) {
                return Err(VoltCoreError::unknown_feature(
                    class,
                    features.first().map_or("", String::as_str),
                ));
            }
            if let Some(feature) = features.iter().find(|f| !valid.contains(class, f)) {
                return Err(VoltCoreError::unknown_feature(class, feature));
            }
        }
        Ok(())
    }

    /// Whether `path` has one of the valid extensions.
    fn is_valid_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.valid_extensions().iter().any(|v| v.eq_ignore_ascii_case(ext)))
    }
}

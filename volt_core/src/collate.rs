//! Merging per-sample features into batches.

use std::collections::BTreeSet;

use crate::adapter::AdaptedSample;
use crate::error::{Result, VoltCoreError};
use crate::types::{AddressTable, Batch, ClassColumns, FeatureMap, SampleFeatures};

/// Batch wire shape: collated input features plus the raw graphs they came
/// from, in the same sample order.
#[derive(Debug)]
pub struct GraphBatch<G> {
    /// Collated input features and address table.
    pub batch: Batch,
    /// Raw object graphs, one per sample.
    pub graphs: Vec<G>,
}

impl<G> GraphBatch<G> {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether the batch holds no sample.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

/// Concatenate the columns of every sample, class by class, in input order.
///
/// Objects inside a sample are never reordered. Samples may have zero objects
/// of a class, but every sample must advertise the same feature set for it.
pub fn collate(samples: &[SampleFeatures]) -> Result<Batch> {
    for sample in samples {
        sample.validate()?;
    }

    let counts: Vec<_> = samples.iter().map(|s| s.counts.clone()).collect();
    let address = AddressTable::from_counts(&counts);

    let classes: BTreeSet<&String> = samples.iter().flat_map(|s| s.features.keys()).collect();
    let mut features = FeatureMap::new();

    for class in classes {
        let advertised = |sample: &SampleFeatures| -> Vec<String> {
            sample
                .features
                .get(class)
                .map(|c| c.keys().cloned().collect())
                .unwrap_or_default()
        };
        let expected = samples.first().map(|s| advertised(s)).unwrap_or_default();

        let mut columns: ClassColumns = expected
            .iter()
            .map(|f| (f.clone(), Vec::with_capacity(address.count(class))))
            .collect();

        for (index, sample) in samples.iter().enumerate() {
            let got = advertised(sample);
            if got != expected {
                return Err(VoltCoreError::FeatureSetMismatch {
                    class: class.clone(),
                    sample: index,
                    expected,
                    got,
                });
            }
            if let Some(sample_columns) = sample.features.get(class) {
                for (feature, values) in sample_columns {
                    if let Some(column) = columns.get_mut(feature) {
                        column.extend_from_slice(values);
                    }
                }
            }
        }
        features.insert(class.clone(), columns);
    }

    Ok(Batch { address, features })
}

/// Collate adapted samples and keep their graphs alongside.
pub fn collate_graphs<G>(samples: Vec<AdaptedSample<G>>) -> Result<GraphBatch<G>> {
    let (features, graphs): (Vec<_>, Vec<_>) = samples
        .into_iter()
        .map(|s| (s.features, s.graph))
        .unzip();
    let batch = collate(&features)?;
    Ok(GraphBatch { batch, graphs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassCounts;

    fn sample(class: &str, column: &[(&str, Vec<f32>)]) -> SampleFeatures {
        let n = column.first().map_or(0, |(_, v)| v.len());
        let mut counts = ClassCounts::new();
        counts.insert(class.to_string(), n);
        let mut features = FeatureMap::new();
        features.insert(
            class.to_string(),
            column
                .iter()
                .map(|(f, v)| (f.to_string(), v.clone()))
                .collect(),
        );
        SampleFeatures::new(counts, features)
    }

    #[test]
    fn test_collate_then_split_preserves_rows() {
        let a = sample("bus", &[("vm_pu", vec![1.0, 1.02])]);
        let b = sample("bus", &[("vm_pu", vec![0.98])]);

        let batch = collate(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(batch.count("bus"), 3);
        assert_eq!(batch.column("bus", "vm_pu").unwrap(), &[1.0, 1.02, 0.98]);

        let parts = batch.split();
        assert_eq!(parts, vec![a, b]);
    }

    #[test]
    fn test_collate_zero_count_sample() {
        let a = sample("load", &[("p_mw", vec![1.0])]);
        let b = sample("load", &[("p_mw", vec![])]);

        let batch = collate(&[a, b]).unwrap();
        assert_eq!(batch.count("load"), 1);
        assert_eq!(batch.address.sample_range("load", 1), 1..1);
    }

    #[test]
    fn test_collate_rejects_feature_set_mismatch() {
        let a = sample("load", &[("p_mw", vec![1.0])]);
        let b = sample("load", &[("q_mvar", vec![0.5])]);

        match collate(&[a, b]) {
            Err(VoltCoreError::FeatureSetMismatch { class, sample, .. }) => {
                assert_eq!(class, "load");
                assert_eq!(sample, 1);
            }
            other => panic!("expected feature set mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_collate_empty_list() {
        let batch = collate(&[]).unwrap();
        assert_eq!(batch.num_samples(), 0);
        assert!(batch.features.is_empty());
    }
}

//! End-to-end tests of the sample pipeline against an in-memory backend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use volt_core::{
    collate, Backend, Batch, ClassCounts, FeatureMap, FeatureNames, Normalizer, NormalizerConfig,
    Result, SampleAdapter, SampleFeatures, VectorCodec, VoltCoreError,
};

/// Backend whose "files" are sample tables kept in memory.
#[derive(Default)]
struct TableBackend {
    tables: HashMap<PathBuf, SampleFeatures>,
}

impl TableBackend {
    fn insert(&mut self, name: &str, sample: SampleFeatures) -> PathBuf {
        let path = PathBuf::from(name);
        self.tables.insert(path.clone(), sample);
        path
    }
}

impl Backend for TableBackend {
    type Graph = SampleFeatures;

    fn valid_extensions(&self) -> &[&'static str] {
        &["json"]
    }

    fn valid_feature_names(&self) -> FeatureNames {
        FeatureNames::new()
            .with_class("bus", ["vm"])
            .with_class("ext_grid", ["vm"])
            .with_class("gen", ["p", "vm"])
            .with_class("load", ["p", "q"])
    }

    fn load(&self, path: &Path) -> Result<SampleFeatures> {
        self.tables
            .get(path)
            .cloned()
            .ok_or_else(|| VoltCoreError::backend(format!("no table {}", path.display())))
    }

    fn run_network(&self, graph: &mut SampleFeatures) -> Result<()> {
        let total: f32 = graph
            .features
            .get("load")
            .and_then(|c| c.get("p"))
            .map_or(0.0, |p| p.iter().sum());
        let buses = graph.count("bus");
        graph
            .features
            .entry("bus".into())
            .or_default()
            .insert("vm".into(), vec![1.0 - 0.01 * total; buses]);
        Ok(())
    }

    fn get_features(&self, graph: &SampleFeatures, names: &FeatureNames) -> Result<SampleFeatures> {
        let mut counts = ClassCounts::new();
        let mut features = FeatureMap::new();
        for (class, wanted) in names.iter() {
            let n = graph.count(class);
            counts.insert(class.to_string(), n);
            let columns = features.entry(class.to_string()).or_default();
            for feature in wanted {
                let values = graph
                    .features
                    .get(class)
                    .and_then(|c| c.get(feature))
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; n]);
                columns.insert(feature.clone(), values);
            }
        }
        Ok(SampleFeatures::new(counts, features))
    }

    fn set_features(&self, graph: &mut SampleFeatures, values: &FeatureMap) -> Result<()> {
        for (class, columns) in values {
            for (feature, column) in columns {
                graph
                    .features
                    .entry(class.clone())
                    .or_default()
                    .insert(feature.clone(), column.clone());
            }
        }
        Ok(())
    }
}

fn grid_sample(loads: usize, gens: usize, ext_grids: usize, buses: usize, base: f32) -> SampleFeatures {
    let mut counts = ClassCounts::new();
    counts.insert("load".into(), loads);
    counts.insert("gen".into(), gens);
    counts.insert("ext_grid".into(), ext_grids);
    counts.insert("bus".into(), buses);

    let mut features = FeatureMap::new();
    let load = features.entry("load".into()).or_default();
    load.insert("p".into(), vec![base; loads]);
    load.insert("q".into(), vec![base * 0.5; loads]);
    let gen = features.entry("gen".into()).or_default();
    gen.insert("p".into(), vec![base * 2.0; gens]);
    gen.insert("vm".into(), vec![1.01; gens]);
    features
        .entry("ext_grid".into())
        .or_default()
        .insert("vm".into(), vec![1.0; ext_grids]);
    SampleFeatures::new(counts, features)
}

fn input_names() -> FeatureNames {
    FeatureNames::new()
        .with_class("load", ["p", "q"])
        .with_class("gen", ["p", "vm"])
        .with_class("ext_grid", ["vm"])
}

fn output_names() -> FeatureNames {
    FeatureNames::new().with_class("bus", ["vm"])
}

#[test]
fn test_end_to_end_mixed_counts() {
    let mut backend = TableBackend::default();
    let a = backend.insert("a.json", grid_sample(1, 1, 0, 2, 1.0));
    let b = backend.insert("b.json", grid_sample(1, 0, 1, 2, 3.0));
    let backend = Arc::new(backend);

    let normalizer = Arc::new(
        Normalizer::build(
            &[a.clone(), b.clone()],
            backend.as_ref(),
            &input_names(),
            &NormalizerConfig::default(),
        )
        .unwrap(),
    );
    let adapter = SampleAdapter::new(backend.clone(), normalizer, input_names(), &output_names());

    let samples: Vec<_> = [a, b]
        .iter()
        .map(|p| adapter.adapt(p).unwrap())
        .collect();
    let graph_batch = volt_core::collate_graphs(samples).unwrap();
    let batch = &graph_batch.batch;

    assert_eq!(batch.count("load"), 2);
    assert_eq!(batch.count("gen"), 1);
    assert_eq!(batch.count("ext_grid"), 1);
    assert_eq!(batch.count("bus"), 4);

    let codec = VectorCodec::from_reference(batch, &input_names(), &output_names()).unwrap();
    assert_eq!(codec.encode(batch).unwrap().len(), 7);

    let decoded = codec.decode(&[0.1, 0.2, 0.3, 0.4]).unwrap();
    assert_eq!(decoded.keys().collect::<Vec<_>>(), vec!["bus"]);
    let predicted = Batch {
        address: batch.address.clone(),
        features: decoded,
    };
    let per_sample = predicted.split();
    assert_eq!(per_sample[0].features["bus"]["vm"], vec![0.1, 0.2]);
    assert_eq!(per_sample[1].features["bus"]["vm"], vec![0.3, 0.4]);

    // Load p is normalized with pooled statistics: values 1 and 3.
    assert_eq!(batch.column("load", "p").unwrap(), &[-1.0, 1.0]);
}

#[test]
fn test_ground_truth_through_backend() {
    let mut backend = TableBackend::default();
    backend.insert("a.json", grid_sample(2, 1, 1, 3, 1.0));
    let mut graphs = vec![backend.load(Path::new("a.json")).unwrap()];

    backend.run_batch(&mut graphs).unwrap();
    let truth = backend.get_feature_batch(&graphs, &output_names()).unwrap();
    let vm = truth.column("bus", "vm").unwrap();
    assert_eq!(vm.len(), 3);
    assert!(vm.iter().all(|v| (v - 0.98).abs() < 1e-6));
}

#[test]
fn test_unknown_feature_is_rejected_before_fitting() {
    let mut backend = TableBackend::default();
    let a = backend.insert("a.json", grid_sample(1, 1, 1, 1, 1.0));
    let names = FeatureNames::new().with_class("load", ["sn_mva"]);
    let err = Normalizer::build(&[a], &backend, &names, &NormalizerConfig::default()).unwrap_err();
    assert!(matches!(err, VoltCoreError::UnknownFeature { .. }));
}

#[test]
fn test_empty_file_list_is_an_error() {
    let backend = TableBackend::default();
    let err = Normalizer::build(&[], &backend, &input_names(), &NormalizerConfig::default())
        .unwrap_err();
    assert_eq!(err, VoltCoreError::EmptySampleSet);
}

#[test]
fn test_gaussian_sample_normalizes_to_unit_scale() {
    let mut rng = StdRng::seed_from_u64(3);
    let values: Vec<f32> = (0..2000)
        .map(|_| {
            let z: f32 = StandardNormal.sample(&mut rng);
            10.0 + 3.0 * z
        })
        .collect();

    let mut pooled = volt_core::PooledValues::new();
    pooled
        .entry("load".into())
        .or_default()
        .insert("p".into(), values.clone());
    let names = FeatureNames::new().with_class("load", ["p"]);
    let normalizer = Normalizer::fit(&pooled, &names, &NormalizerConfig::default());

    let mut raw = FeatureMap::new();
    raw.entry("load".into()).or_default().insert("p".into(), values);
    let normalized = &normalizer.normalize(&raw).unwrap()["load"]["p"];

    let n = normalized.len() as f32;
    let mean = normalized.iter().sum::<f32>() / n;
    let std = (normalized.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n).sqrt();
    assert!(mean.abs() < 0.05, "mean = {mean}");
    assert!((std - 1.0).abs() < 0.1, "std = {std}");
}

fn bus_sample(values: Vec<f32>) -> SampleFeatures {
    let mut counts = ClassCounts::new();
    counts.insert("bus".into(), values.len());
    let mut features = FeatureMap::new();
    features
        .entry("bus".into())
        .or_default()
        .insert("vm".into(), values);
    SampleFeatures::new(counts, features)
}

#[test]
fn test_collation_keeps_input_order() {
    let a = bus_sample(vec![1.0, 2.0]);
    let b = bus_sample(vec![3.0]);
    let batch = collate(&[a.clone(), b.clone()]).unwrap();
    assert_eq!(batch.column("bus", "vm").unwrap(), &[1.0, 2.0, 3.0]);
    assert_eq!(batch.address.sample_range("bus", 0), 0..2);
    assert_eq!(batch.address.sample_range("bus", 1), 2..3);
    assert_eq!(batch.split(), vec![a.clone(), b.clone()]);

    let reversed = collate(&[b.clone(), a.clone()]).unwrap();
    assert_eq!(reversed.column("bus", "vm").unwrap(), &[3.0, 1.0, 2.0]);
    assert_eq!(reversed.address.sample_range("bus", 0), 0..1);
    assert_eq!(reversed.address.sample_range("bus", 1), 1..3);
    assert_eq!(reversed.split(), vec![b, a]);
}

proptest! {
    #[test]
    fn prop_collate_split_round_trip(columns in prop::collection::vec(
        prop::collection::vec(-1e3f32..1e3, 0..5), 1..6)
    ) {
        let samples: Vec<_> = columns.into_iter().map(bus_sample).collect();
        let batch = collate(&samples).unwrap();
        let total: usize = samples.iter().map(|s| s.count("bus")).sum();
        prop_assert_eq!(batch.count("bus"), total);
        prop_assert_eq!(batch.split(), samples);
    }

    #[test]
    fn prop_codec_rows_round_trip(loads in 0usize..4, gens in 0usize..3, base in -5f32..5.0) {
        let sample = grid_sample(loads, gens, 1, 2, base);
        let reference = collate(&[sample.clone()]).unwrap();
        let codec = VectorCodec::from_reference(&reference, &input_names(), &output_names()).unwrap();

        prop_assert_eq!(codec.input_len(), 2 * loads + 2 * gens + 1);
        let batch = collate(&[sample.clone(), sample.clone(), sample]).unwrap();
        let rows = codec.encode_rows(&batch).unwrap();
        prop_assert_eq!(rows.len(), 3);
        for row in rows {
            let decoded = codec.decode_inputs(&row).unwrap();
            for (class, columns) in &decoded {
                for (feature, values) in columns {
                    prop_assert_eq!(Some(values.as_slice()), reference.column(class, feature));
                }
            }
        }
    }
}

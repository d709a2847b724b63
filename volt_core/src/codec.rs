//! Flattening batches into fixed-length vectors and back.
//!
//! The layout of a vector is fixed when the codec is built: classes in
//! lexicographic order, features in declared order, objects in address order.
//! Offsets only depend on per-class object counts and feature counts, so two
//! segments never overlap and `decode` is the exact inverse of the layout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoltCoreError};
use crate::types::{Batch, ClassCounts, FeatureMap, FeatureNames, SampleFeatures};

/// Object counts per class recorded from a reference batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(ClassCounts);

impl Schema {
    /// Schema of explicit per-class counts.
    pub fn new(counts: ClassCounts) -> Self {
        Self(counts)
    }

    /// Recorded count of a class (0 if unknown).
    pub fn count(&self, class: &str) -> usize {
        self.0.get(class).copied().unwrap_or(0)
    }

    /// Iterate over `(class, count)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(c, n)| (c.as_str(), *n))
    }

    /// Underlying counts.
    pub fn counts(&self) -> &ClassCounts {
        &self.0
    }
}

/// One contiguous `(class, feature)` slot range of a flat vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Object class.
    pub class: String,
    /// Feature name.
    pub feature: String,
    /// First slot.
    pub offset: usize,
    /// Number of slots (the class's object count).
    pub len: usize,
}

fn layout(schema: &Schema, names: &FeatureNames) -> (Vec<Segment>, usize) {
    let mut segments = Vec::with_capacity(names.num_features());
    let mut offset = 0;
    for (class, features) in names.iter() {
        let len = schema.count(class);
        for feature in features {
            segments.push(Segment {
                class: class.to_string(),
                feature: feature.clone(),
                offset,
                len,
            });
            offset += len;
        }
    }
    (segments, offset)
}

/// Fixed-layout codec between collated batches and flat vectors.
///
/// A codec only handles batches whose per-class object counts equal those of
/// the reference batch it was built from. Grids of varying topology need one
/// codec per topology.
///
/// When the reference holds a single sample, [`VectorCodec::encode_rows`] and
/// [`VectorCodec::decode_rows`] handle multi-sample batches one row per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorCodec {
    schema: Schema,
    input_names: FeatureNames,
    output_names: FeatureNames,
    input_layout: Vec<Segment>,
    output_layout: Vec<Segment>,
    input_len: usize,
    output_len: usize,
}

impl VectorCodec {
    /// Record the schema of `reference` for every class named by either set.
    pub fn from_reference(
        reference: &Batch,
        input_names: &FeatureNames,
        output_names: &FeatureNames,
    ) -> Result<Self> {
        let counts: ClassCounts = input_names
            .classes()
            .chain(output_names.classes())
            .map(|class| (class.to_string(), reference.count(class)))
            .collect();
        Self::from_schema(Schema(counts), input_names, output_names)
    }

    /// Build a codec from explicit counts.
    pub fn from_schema(
        schema: Schema,
        input_names: &FeatureNames,
        output_names: &FeatureNames,
    ) -> Result<Self> {
        if input_names.num_features() == 0 {
            return Err(VoltCoreError::InvalidConfig {
                message: "no input feature declared".into(),
            });
        }
        if output_names.num_features() == 0 {
            return Err(VoltCoreError::InvalidConfig {
                message: "no output feature declared".into(),
            });
        }
        let (input_layout, input_len) = layout(&schema, input_names);
        let (output_layout, output_len) = layout(&schema, output_names);
        Ok(Self {
            schema,
            input_names: input_names.clone(),
            output_names: output_names.clone(),
            input_layout,
            output_layout,
            input_len,
            output_len,
        })
    }

    /// Recorded object counts.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Length of an encoded input vector.
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Length of an output vector.
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Segments of an input vector.
    pub fn input_layout(&self) -> &[Segment] {
        &self.input_layout
    }

    /// Segments of an output vector.
    pub fn output_layout(&self) -> &[Segment] {
        &self.output_layout
    }

    /// Input feature names.
    pub fn input_names(&self) -> &FeatureNames {
        &self.input_names
    }

    /// Output feature names.
    pub fn output_names(&self) -> &FeatureNames {
        &self.output_names
    }

    /// Flatten the input features of a batch.
    pub fn encode(&self, batch: &Batch) -> Result<Vec<f32>> {
        self.flatten(&batch.counts(), &batch.features, &self.input_layout, self.input_len)
    }

    /// Flatten the output features of a batch (ground truth).
    pub fn encode_targets(&self, batch: &Batch) -> Result<Vec<f32>> {
        self.flatten(
            &batch.counts(),
            &batch.features,
            &self.output_layout,
            self.output_len,
        )
    }

    /// Flatten the input features of every sample of a batch, one row each.
    pub fn encode_rows(&self, batch: &Batch) -> Result<Vec<Vec<f32>>> {
        self.rows(batch, &self.input_layout, self.input_len)
    }

    /// Flatten the output features of every sample of a batch, one row each.
    pub fn encode_target_rows(&self, batch: &Batch) -> Result<Vec<Vec<f32>>> {
        self.rows(batch, &self.output_layout, self.output_len)
    }

    /// Unflatten an output vector into per-class feature columns.
    pub fn decode(&self, vector: &[f32]) -> Result<FeatureMap> {
        unflatten(&self.output_layout, self.output_len, vector)
    }

    /// Unflatten an input vector.
    pub fn decode_inputs(&self, vector: &[f32]) -> Result<FeatureMap> {
        unflatten(&self.input_layout, self.input_len, vector)
    }

    /// Unflatten a row-major `[n, output_len]` matrix, one mapping per row.
    pub fn decode_rows(&self, matrix: &[f32]) -> Result<Vec<FeatureMap>> {
        if self.output_len == 0 || matrix.len() % self.output_len != 0 {
            let rows = matrix.len() / self.output_len.max(1);
            return Err(VoltCoreError::LengthMismatch {
                expected: (rows + 1) * self.output_len,
                got: matrix.len(),
            });
        }
        matrix
            .chunks(self.output_len)
            .map(|row| self.decode(row))
            .collect()
    }

    fn rows(&self, batch: &Batch, segments: &[Segment], len: usize) -> Result<Vec<Vec<f32>>> {
        batch
            .split()
            .iter()
            .map(|sample: &SampleFeatures| {
                self.flatten(&sample.counts, &sample.features, segments, len)
            })
            .collect()
    }

    /// Classes checked against the schema: those laid out in `segments` and
    /// every schema class the counts know about.
    fn check_counts(&self, counts: &ClassCounts, segments: &[Segment]) -> Result<()> {
        for (class, expected) in self.schema.iter() {
            let needed = segments.iter().any(|s| s.class == class);
            let got = counts.get(class).copied();
            if needed || got.is_some() {
                let got = got.unwrap_or(0);
                if got != expected {
                    return Err(VoltCoreError::SchemaMismatch {
                        class: class.to_string(),
                        expected,
                        got,
                    });
                }
            }
        }
        Ok(())
    }

    fn flatten(
        &self,
        counts: &ClassCounts,
        features: &FeatureMap,
        segments: &[Segment],
        len: usize,
    ) -> Result<Vec<f32>> {
        self.check_counts(counts, segments)?;
        let mut out = Vec::with_capacity(len);
        for segment in segments {
            let column = features
                .get(&segment.class)
                .and_then(|c| c.get(&segment.feature))
                .ok_or_else(|| VoltCoreError::unknown_feature(&segment.class, &segment.feature))?;
            if column.len() != segment.len {
                return Err(VoltCoreError::ColumnLength {
                    class: segment.class.clone(),
                    feature: segment.feature.clone(),
                    expected: segment.len,
                    got: column.len(),
                });
            }
            out.extend_from_slice(column);
        }
        Ok(out)
    }
}

fn unflatten(segments: &[Segment], len: usize, vector: &[f32]) -> Result<FeatureMap> {
    if vector.len() != len {
        return Err(VoltCoreError::LengthMismatch {
            expected: len,
            got: vector.len(),
        });
    }
    let mut out: FeatureMap = BTreeMap::new();
    for segment in segments {
        out.entry(segment.class.clone()).or_default().insert(
            segment.feature.clone(),
            vector[segment.offset..segment.offset + segment.len].to_vec(),
        );
    }
    Ok(out)
}

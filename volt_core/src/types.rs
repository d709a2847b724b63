//! Data model shared by every stage of the pipeline.
//!
//! A grid sample is a set of object classes (bus, load, gen, ...), each with
//! zero or more objects. Features are stored column-wise: for every class, a
//! map from feature name to one value per object. A [`Batch`] concatenates the
//! columns of several samples and keeps an [`AddressTable`] to undo it.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoltCoreError};

/// Feature columns of one object class: feature name to one value per object.
pub type ClassColumns = BTreeMap<String, Vec<f32>>;

/// Nested feature mapping: class name to [`ClassColumns`].
pub type FeatureMap = BTreeMap<String, ClassColumns>;

/// Per-class object counts.
pub type ClassCounts = BTreeMap<String, usize>;

/// Ordered feature names per object class, e.g. `{"load": ["p_mw", "q_mvar"]}`.
///
/// Classes iterate in lexicographic order; features keep their declared order.
/// A class may carry an empty feature list, which still requests its object
/// count from a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureNames(BTreeMap<String, Vec<String>>);

impl FeatureNames {
    /// Create an empty name set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a class and its features.
    pub fn with_class<I, S>(mut self, class: impl Into<String>, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(class, features);
        self
    }

    /// Insert (or replace) a class and its features.
    pub fn insert<I, S>(&mut self, class: impl Into<String>, features: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(class.into(), features.into_iter().map(Into::into).collect());
    }

    /// Features declared for `class` (empty if the class is absent).
    pub fn features(&self, class: &str) -> &[String] {
        self.0.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the class is declared.
    pub fn has_class(&self, class: &str) -> bool {
        self.0.contains_key(class)
    }

    /// Whether the (class, feature) pair is declared.
    pub fn contains(&self, class: &str, feature: &str) -> bool {
        self.features(class).iter().any(|f| f == feature)
    }

    /// Declared classes in lexicographic order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over `(class, features)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(c, f)| (c.as_str(), f.as_slice()))
    }

    /// Number of declared classes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no class is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of (class, feature) pairs.
    pub fn num_features(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Same classes with empty feature lists.
    pub fn classes_only(&self) -> FeatureNames {
        FeatureNames(self.0.keys().map(|c| (c.clone(), Vec::new())).collect())
    }

    /// Union of two name sets. Features of `self` come first, then the
    /// features of `other` not already present.
    pub fn union(&self, other: &FeatureNames) -> FeatureNames {
        let mut merged = self.0.clone();
        for (class, features) in &other.0 {
            let entry = merged.entry(class.clone()).or_default();
            for feature in features {
                if !entry.contains(feature) {
                    entry.push(feature.clone());
                }
            }
        }
        FeatureNames(merged)
    }
}

impl<C, I, S> FromIterator<(C, I)> for FeatureNames
where
    C: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (C, I)>>(iter: T) -> Self {
        let mut names = FeatureNames::new();
        for (class, features) in iter {
            names.insert(class, features);
        }
        names
    }
}

/// Position of one object inside the batch it was collated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectAddress {
    /// Index of the sample within the batch.
    pub sample: usize,
    /// Index of the object within that sample's class collection.
    pub local: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ClassAddresses {
    entries: Vec<ObjectAddress>,
    /// `offsets[s]..offsets[s + 1]` are the batch rows of sample `s`.
    offsets: Vec<usize>,
}

/// Per-class map from batch row to [`ObjectAddress`].
///
/// The number of rows of a class equals the sum of that class's per-sample
/// object counts, and rows of one sample are contiguous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTable {
    num_samples: usize,
    classes: BTreeMap<String, ClassAddresses>,
}

impl AddressTable {
    /// Build the table from the per-sample object counts, in sample order.
    ///
    /// A class absent from a sample's counts contributes zero objects.
    pub fn from_counts(per_sample: &[ClassCounts]) -> Self {
        let mut names: Vec<&String> = per_sample.iter().flat_map(|c| c.keys()).collect();
        names.sort();
        names.dedup();

        let mut classes = BTreeMap::new();
        for class in names {
            let mut entries = Vec::new();
            let mut offsets = Vec::with_capacity(per_sample.len() + 1);
            offsets.push(0);
            for (sample, counts) in per_sample.iter().enumerate() {
                let n = counts.get(class).copied().unwrap_or(0);
                entries.extend((0..n).map(|local| ObjectAddress { sample, local }));
                offsets.push(entries.len());
            }
            classes.insert(class.clone(), ClassAddresses { entries, offsets });
        }

        Self {
            num_samples: per_sample.len(),
            classes,
        }
    }

    /// Number of samples recorded.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Classes known to the table.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Whether the class appears in the table.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Total object count of a class across the batch.
    pub fn count(&self, class: &str) -> usize {
        self.classes.get(class).map_or(0, |c| c.entries.len())
    }

    /// Total object counts of every class.
    pub fn counts(&self) -> ClassCounts {
        self.classes
            .iter()
            .map(|(c, a)| (c.clone(), a.entries.len()))
            .collect()
    }

    /// Addresses of every row of a class.
    pub fn addresses(&self, class: &str) -> &[ObjectAddress] {
        self.classes
            .get(class)
            .map(|c| c.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Address of one batch row.
    pub fn get(&self, class: &str, row: usize) -> Option<ObjectAddress> {
        self.classes.get(class)?.entries.get(row).copied()
    }

    /// Batch rows holding the objects of `class` in sample `sample`.
    pub fn sample_range(&self, class: &str, sample: usize) -> Range<usize> {
        match self.classes.get(class) {
            Some(c) if sample < self.num_samples => c.offsets[sample]..c.offsets[sample + 1],
            _ => 0..0,
        }
    }

    /// Object counts of a single sample.
    pub fn sample_counts(&self, sample: usize) -> ClassCounts {
        self.classes
            .keys()
            .map(|class| (class.clone(), self.sample_range(class, sample).len()))
            .collect()
    }
}

/// Features of one sample together with its per-class object counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleFeatures {
    /// Object count per class, including classes without extracted features.
    pub counts: ClassCounts,
    /// Feature columns per class.
    pub features: FeatureMap,
}

impl SampleFeatures {
    /// Create a sample from counts and columns.
    pub fn new(counts: ClassCounts, features: FeatureMap) -> Self {
        Self { counts, features }
    }

    /// Object count of a class (0 if absent).
    pub fn count(&self, class: &str) -> usize {
        self.counts.get(class).copied().unwrap_or(0)
    }

    /// Check that every column has one value per object.
    pub fn validate(&self) -> Result<()> {
        for (class, columns) in &self.features {
            let expected = self.count(class);
            for (feature, values) in columns {
                if values.len() != expected {
                    return Err(VoltCoreError::ColumnLength {
                        class: class.clone(),
                        feature: feature.clone(),
                        expected,
                        got: values.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Collated features of several samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Where each row of each class came from.
    pub address: AddressTable,
    /// Concatenated feature columns.
    pub features: FeatureMap,
}

impl Batch {
    /// Number of collated samples.
    pub fn num_samples(&self) -> usize {
        self.address.num_samples()
    }

    /// Total object count of a class.
    pub fn count(&self, class: &str) -> usize {
        self.address.count(class)
    }

    /// Total object counts of every class.
    pub fn counts(&self) -> ClassCounts {
        self.address.counts()
    }

    /// One feature column, if present.
    pub fn column(&self, class: &str, feature: &str) -> Option<&[f32]> {
        self.features
            .get(class)
            .and_then(|c| c.get(feature))
            .map(Vec::as_slice)
    }

    /// Check that every column matches the row count of its class.
    pub fn validate(&self) -> Result<()> {
        for (class, columns) in &self.features {
            let expected = self.count(class);
            for (feature, values) in columns {
                if values.len() != expected {
                    return Err(VoltCoreError::ColumnLength {
                        class: class.clone(),
                        feature: feature.clone(),
                        expected,
                        got: values.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Features of one sample, cut out of the batch through the address table.
    pub fn sample_features(&self, sample: usize) -> SampleFeatures {
        let counts = self.address.sample_counts(sample);
        let features = self
            .features
            .iter()
            .map(|(class, columns)| {
                let range = self.address.sample_range(class, sample);
                let columns = columns
                    .iter()
                    .map(|(feature, values)| {
                        let slice = values.get(range.clone()).unwrap_or(&[]);
                        (feature.clone(), slice.to_vec())
                    })
                    .collect();
                (class.clone(), columns)
            })
            .collect();
        SampleFeatures { counts, features }
    }

    /// Undo collation: per-sample features in batch order.
    pub fn split(&self) -> Vec<SampleFeatures> {
        (0..self.num_samples())
            .map(|s| self.sample_features(s))
            .collect()
    }
}

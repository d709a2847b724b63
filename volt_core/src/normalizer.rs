//! Per-feature normalization statistics.
//!
//! A [`Normalizer`] is fitted once on a bounded sample of dataset files and
//! then applied unchanged to every sample. Statistics are pooled across all
//! sampled files, never computed per file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoltCoreError};
use crate::traits::Backend;
use crate::types::{FeatureMap, FeatureNames, SampleFeatures};

/// Pooled raw values: class to feature to every observed value.
pub type PooledValues = BTreeMap<String, BTreeMap<String, Vec<f32>>>;

/// How statistics are fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationMethod {
    /// `(x - mean) / max(std, epsilon)`.
    Standard,
    /// Piecewise-linear map through empirical quantiles onto `[-1, 1]`.
    Quantile {
        /// Number of evenly spaced quantile probabilities.
        break_points: usize,
    },
}

/// Settings for fitting a [`Normalizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Fitting method.
    pub method: NormalizationMethod,
    /// Lower bound of the scale denominator.
    pub epsilon: f32,
    /// Maximum number of files scanned.
    pub amount_of_samples: usize,
    /// Shuffle the file list before truncating it.
    pub shuffle: bool,
    /// Seed of the shuffle.
    pub seed: u64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            method: NormalizationMethod::Standard,
            epsilon: 1e-6,
            amount_of_samples: 100,
            shuffle: false,
            seed: 0,
        }
    }
}

impl NormalizerConfig {
    /// Check the settings.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.epsilon.is_nan() || self.epsilon <= 0.0 {
            return Err("epsilon must be positive".into());
        }
        if self.amount_of_samples == 0 {
            return Err("amount_of_samples must be positive".into());
        }
        if let NormalizationMethod::Quantile { break_points } = self.method {
            if break_points < 2 {
                return Err("quantile normalization needs at least 2 break points".into());
            }
        }
        Ok(())
    }
}

/// Pick the files used for fitting: optionally shuffled with a seeded RNG,
/// then truncated to `amount`.
pub fn select_sample(files: &[PathBuf], amount: usize, shuffle: bool, seed: u64) -> Vec<PathBuf> {
    let mut selected = files.to_vec();
    if shuffle {
        let mut rng = StdRng::seed_from_u64(seed);
        selected.shuffle(&mut rng);
    }
    selected.truncate(amount);
    selected
}

/// Scaling function of one (class, feature) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureStatistic {
    /// Leave values unchanged.
    Identity,
    /// `(x - mean) / scale`.
    Affine {
        /// Pooled mean.
        mean: f32,
        /// Pooled standard deviation clamped to epsilon.
        scale: f32,
    },
    /// `x - value`, used when every quantile collapses to one value.
    Shift {
        /// Shifted-out constant.
        value: f32,
    },
    /// Linear interpolation through `(knots[i], values[i])`, extrapolated
    /// beyond both ends.
    PiecewiseLinear {
        /// Strictly increasing input knots.
        knots: Vec<f32>,
        /// Mapped values, in `[-1, 1]` at the knots.
        values: Vec<f32>,
    },
}

impl FeatureStatistic {
    /// Mean/std statistic (population std).
    pub fn standard(samples: &[f32], epsilon: f32) -> Self {
        if samples.is_empty() {
            return Self::Identity;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
        let var = samples
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        Self::Affine {
            mean: mean as f32,
            scale: (var.sqrt() as f32).max(epsilon),
        }
    }

    /// Quantile statistic through `break_points` probabilities `i / break_points`.
    pub fn quantile(samples: &[f32], break_points: usize) -> Self {
        if samples.is_empty() || break_points == 0 {
            return Self::Identity;
        }
        let mut sorted: Vec<f32> = samples.iter().copied().filter(|x| !x.is_nan()).collect();
        if sorted.is_empty() {
            return Self::Identity;
        }
        sorted.sort_by(f32::total_cmp);

        let probabilities = (0..break_points).map(|i| i as f64 / break_points as f64);
        let quantiles: Vec<(f32, f64)> = probabilities
            .map(|p| (interpolated_quantile(&sorted, p), p))
            .collect();

        // Merge equal quantiles, averaging their probabilities.
        let mut knots: Vec<f32> = Vec::new();
        let mut grouped: Vec<(f64, usize)> = Vec::new();
        for (q, p) in quantiles {
            match knots.last() {
                Some(&last) if last == q => {
                    if let Some(g) = grouped.last_mut() {
                        g.0 += p;
                        g.1 += 1;
                    }
                }
                _ => {
                    knots.push(q);
                    grouped.push((p, 1));
                }
            }
        }

        if knots.len() == 1 {
            return Self::Shift { value: knots[0] };
        }

        let values = grouped
            .iter()
            .map(|&(sum, count)| (-1.0 + 2.0 * sum / count as f64) as f32)
            .collect();
        Self::PiecewiseLinear { knots, values }
    }

    /// Apply the statistic to one value.
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Self::Identity => x,
            Self::Affine { mean, scale } => (x - mean) / scale,
            Self::Shift { value } => x - value,
            Self::PiecewiseLinear { knots, values } => interpolate(knots, values, x),
        }
    }

    /// Invert the statistic, if it is invertible.
    pub fn invert(&self, y: f32) -> Option<f32> {
        match self {
            Self::Identity => Some(y),
            Self::Affine { mean, scale } => Some(y * scale + mean),
            Self::Shift { value } => Some(y + value),
            Self::PiecewiseLinear { knots, values } => {
                if values.windows(2).all(|w| w[0] < w[1]) {
                    Some(interpolate(values, knots, y))
                } else {
                    None
                }
            }
        }
    }

    /// Short name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Affine { .. } => "affine",
            Self::Shift { .. } => "shift",
            Self::PiecewiseLinear { .. } => "piecewise_linear",
        }
    }
}

/// Linear-interpolated quantile of sorted data (numpy's default rule).
fn interpolated_quantile(sorted: &[f32], p: f64) -> f32 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    (sorted[lo] as f64 + frac * (sorted[hi] as f64 - sorted[lo] as f64)) as f32
}

/// Piecewise-linear interpolation with linear extrapolation at both ends.
/// `xs` must be strictly increasing and hold at least two points.
fn interpolate(xs: &[f32], ys: &[f32], x: f32) -> f32 {
    if xs.len() < 2 || ys.len() < xs.len() {
        return match (xs.first(), ys.first()) {
            (Some(&x0), Some(&y0)) => x - x0 + y0,
            _ => x,
        };
    }
    let upper = xs.partition_point(|&k| k <= x).clamp(1, xs.len() - 1);
    let (x0, x1) = (xs[upper - 1], xs[upper]);
    let (y0, y1) = (ys[upper - 1], ys[upper]);
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Fitted statistics for every (class, feature) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Normalizer {
    statistics: BTreeMap<String, BTreeMap<String, FeatureStatistic>>,
}

impl Normalizer {
    /// Fit statistics on a sample of dataset files.
    ///
    /// Files are selected with [`select_sample`]; each one is loaded through
    /// the backend and its raw values of `features` are pooled.
    pub fn build<B: Backend>(
        files: &[PathBuf],
        backend: &B,
        features: &FeatureNames,
        config: &NormalizerConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|message| VoltCoreError::InvalidConfig { message })?;
        backend.check_feature_names(features)?;

        let selected = select_sample(
            files,
            config.amount_of_samples,
            config.shuffle,
            config.seed,
        );
        if selected.is_empty() {
            return Err(VoltCoreError::EmptySampleSet);
        }

        let mut pooled = PooledValues::new();
        for path in &selected {
            let graph = backend.load(path)?;
            let sample = backend.get_features(&graph, features)?;
            for (class, columns) in sample.features {
                let class_pool = pooled.entry(class).or_default();
                for (feature, values) in columns {
                    class_pool.entry(feature).or_default().extend(values);
                }
            }
        }

        let normalizer = Self::fit(&pooled, features, config);
        log::info!(
            "Fitted {} feature statistics from {} files",
            normalizer.len(),
            selected.len()
        );
        Ok(normalizer)
    }

    /// Fit statistics from already pooled values.
    ///
    /// Pairs of `features` absent from `pooled` (or with no value) get the
    /// identity statistic.
    pub fn fit(pooled: &PooledValues, features: &FeatureNames, config: &NormalizerConfig) -> Self {
        let mut statistics: BTreeMap<String, BTreeMap<String, FeatureStatistic>> = BTreeMap::new();
        for (class, names) in features.iter() {
            let class_stats = statistics.entry(class.to_string()).or_default();
            for feature in names {
                let values = pooled
                    .get(class)
                    .and_then(|c| c.get(feature))
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let statistic = match config.method {
                    NormalizationMethod::Standard => {
                        FeatureStatistic::standard(values, config.epsilon)
                    }
                    NormalizationMethod::Quantile { break_points } => {
                        FeatureStatistic::quantile(values, break_points)
                    }
                };
                if values.is_empty() {
                    log::warn!("No value of {class}.{feature} in the sample, using identity");
                }
                class_stats.insert(feature.clone(), statistic);
            }
        }
        Self { statistics }
    }

    /// Build from explicit statistics.
    pub fn from_statistics(statistics: BTreeMap<String, BTreeMap<String, FeatureStatistic>>) -> Self {
        Self { statistics }
    }

    /// Statistic of one pair.
    pub fn statistic(&self, class: &str, feature: &str) -> Option<&FeatureStatistic> {
        self.statistics.get(class)?.get(feature)
    }

    /// Number of fitted pairs.
    pub fn len(&self) -> usize {
        self.statistics.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing was fitted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pairs covered by this normalizer.
    pub fn feature_names(&self) -> FeatureNames {
        self.statistics
            .iter()
            .map(|(class, stats)| (class.clone(), stats.keys().cloned().collect::<Vec<_>>()))
            .collect()
    }

    /// Normalize raw feature columns elementwise.
    ///
    /// Every pair in `raw` must have a statistic.
    pub fn normalize(&self, raw: &FeatureMap) -> Result<FeatureMap> {
        self.map_columns(raw, |stat, x| Some(stat.apply(x)))
    }

    /// Normalize the columns of one sample, keeping its counts.
    pub fn normalize_sample(&self, sample: SampleFeatures) -> Result<SampleFeatures> {
        let features = self.normalize(&sample.features)?;
        Ok(SampleFeatures {
            counts: sample.counts,
            features,
        })
    }

    /// Map normalized columns back to raw units.
    pub fn denormalize(&self, normalized: &FeatureMap) -> Result<FeatureMap> {
        self.map_columns(normalized, FeatureStatistic::invert)
    }

    fn map_columns<F>(&self, input: &FeatureMap, f: F) -> Result<FeatureMap>
    where
        F: Fn(&FeatureStatistic, f32) -> Option<f32>,
    {
        let mut out = FeatureMap::new();
        for (class, columns) in input {
            let mut mapped = BTreeMap::new();
            for (feature, values) in columns {
                let stat = self
                    .statistic(class, feature)
                    .ok_or_else(|| VoltCoreError::unknown_feature(class, feature))?;
                let column = values
                    .iter()
                    .map(|&x| f(stat, x))
                    .collect::<Option<Vec<f32>>>()
                    .ok_or_else(|| VoltCoreError::InverseUndefined {
                        class: class.clone(),
                        feature: feature.clone(),
                        kind: stat.kind().to_string(),
                    })?;
                mapped.insert(feature.clone(), column);
            }
            out.insert(class.clone(), mapped);
        }
        Ok(out)
    }
}

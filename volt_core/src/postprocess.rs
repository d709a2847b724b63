//! Per-feature elementwise transforms applied to decoded predictions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoltCoreError};
use crate::types::FeatureMap;

fn unit_scale() -> f32 {
    1.0
}

/// One elementwise transform.
///
/// JSON form: `{"kind": "affine", "offset": 0.5, "scale": 2.0}`, `{"kind": "exp"}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformSpec {
    /// `y = scale * x + offset`.
    Affine {
        /// Additive term.
        #[serde(default)]
        offset: f32,
        /// Multiplicative term.
        #[serde(default = "unit_scale")]
        scale: f32,
    },
    /// `y = e^x`.
    Exp,
    /// `y = tanh(x)`.
    Tanh,
    /// `y = |x|`, not invertible.
    Abs,
}

impl TransformSpec {
    /// Affine transform `scale * x + offset`.
    pub fn affine(offset: f32, scale: f32) -> Self {
        Self::Affine { offset, scale }
    }

    /// Transform name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Affine { .. } => "affine",
            Self::Exp => "exp",
            Self::Tanh => "tanh",
            Self::Abs => "abs",
        }
    }

    /// Whether [`TransformSpec::inverse`] is defined.
    pub fn is_invertible(&self) -> bool {
        match *self {
            Self::Affine { scale, .. } => scale != 0.0 && scale.is_finite(),
            Self::Exp | Self::Tanh => true,
            Self::Abs => false,
        }
    }

    /// Apply to one value.
    pub fn apply(&self, x: f32) -> f32 {
        match *self {
            Self::Affine { offset, scale } => scale * x + offset,
            Self::Exp => x.exp(),
            Self::Tanh => x.tanh(),
            Self::Abs => x.abs(),
        }
    }

    /// Whether `y` lies in the range of the transform, where the inverse is
    /// finite: `y > 0` for `exp`, `-1 < y < 1` for `tanh`.
    pub fn in_range(&self, y: f32) -> bool {
        match *self {
            Self::Affine { .. } | Self::Abs => !y.is_nan(),
            Self::Exp => y > 0.0,
            Self::Tanh => y.abs() < 1.0,
        }
    }

    /// Invert one value.
    ///
    /// `None` when the transform is not invertible or `y` is outside its
    /// range (see [`TransformSpec::in_range`]).
    pub fn inverse(&self, y: f32) -> Option<f32> {
        if !self.is_invertible() || !self.in_range(y) {
            return None;
        }
        match *self {
            Self::Affine { offset, scale } => Some((y - offset) / scale),
            Self::Exp => Some(y.ln()),
            Self::Tanh => Some(y.atanh()),
            Self::Abs => None,
        }
    }
}

/// Transform chains: class to feature to ordered transforms.
pub type TransformChains = BTreeMap<String, BTreeMap<String, Vec<TransformSpec>>>;

/// Applies each feature's chain left to right. Features without a chain pass
/// through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostProcessor {
    chains: TransformChains,
}

impl PostProcessor {
    /// Build from explicit chains.
    pub fn new(chains: TransformChains) -> Self {
        Self { chains }
    }

    /// No transform at all.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Builder-style chain registration.
    pub fn with_chain(
        mut self,
        class: impl Into<String>,
        feature: impl Into<String>,
        chain: Vec<TransformSpec>,
    ) -> Self {
        self.chains
            .entry(class.into())
            .or_default()
            .insert(feature.into(), chain);
        self
    }

    /// Chain of one pair (empty for identity).
    pub fn chain(&self, class: &str, feature: &str) -> &[TransformSpec] {
        self.chains
            .get(class)
            .and_then(|c| c.get(feature))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All chains.
    pub fn chains(&self) -> &TransformChains {
        &self.chains
    }

    /// Whether every chain can be inverted.
    pub fn is_invertible(&self) -> bool {
        self.chains
            .values()
            .flat_map(BTreeMap::values)
            .flatten()
            .all(TransformSpec::is_invertible)
    }

    /// Apply every chain to a decoded mapping.
    pub fn apply(&self, values: &FeatureMap) -> FeatureMap {
        let mut out = values.clone();
        self.apply_in_place(&mut out);
        out
    }

    /// Apply every chain in place.
    pub fn apply_in_place(&self, values: &mut FeatureMap) {
        for (class, columns) in values.iter_mut() {
            for (feature, column) in columns.iter_mut() {
                let chain = self.chain(class, feature);
                if chain.is_empty() {
                    continue;
                }
                for x in column.iter_mut() {
                    *x = chain.iter().fold(*x, |acc, t| t.apply(acc));
                }
            }
        }
    }

    /// Undo every chain, right to left.
    ///
    /// Fails on the first chain holding a non-invertible transform, and on
    /// the first value outside the range of the transform it reaches.
    pub fn inverse(&self, values: &FeatureMap) -> Result<FeatureMap> {
        let mut out = values.clone();
        for (class, columns) in out.iter_mut() {
            for (feature, column) in columns.iter_mut() {
                let chain = self.chain(class, feature);
                if let Some(bad) = chain.iter().find(|t| !t.is_invertible()) {
                    return Err(VoltCoreError::InverseUndefined {
                        class: class.clone(),
                        feature: feature.clone(),
                        kind: bad.kind().to_string(),
                    });
                }
                for y in column.iter_mut() {
                    for t in chain.iter().rev() {
                        *y = t.inverse(*y).ok_or_else(|| VoltCoreError::InverseOutOfDomain {
                            class: class.clone(),
                            feature: feature.clone(),
                            kind: t.kind().to_string(),
                            value: *y,
                        })?;
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_column(values: Vec<f32>) -> FeatureMap {
        let mut m = FeatureMap::new();
        m.entry("bus".into())
            .or_default()
            .insert("vm_pu".into(), values);
        m
    }

    #[test]
    fn test_affine_apply_and_inverse() {
        let t = TransformSpec::affine(0.5, 2.0);
        assert_eq!(t.apply(3.0), 6.5);
        assert_eq!(t.inverse(6.5), Some(3.0));
        assert!(!TransformSpec::affine(1.0, 0.0).is_invertible());
    }

    #[test]
    fn test_chain_composes_left_to_right() {
        let post = PostProcessor::identity().with_chain(
            "bus",
            "vm_pu",
            vec![TransformSpec::affine(1.0, 1.0), TransformSpec::affine(0.0, 3.0)],
        );
        let out = post.apply(&bus_column(vec![0.0, 1.0]));
        assert_eq!(out["bus"]["vm_pu"], vec![3.0, 6.0]);

        let back = post.inverse(&out).unwrap();
        assert_eq!(back["bus"]["vm_pu"], vec![0.0, 1.0]);
    }

    #[test]
    fn test_abs_is_not_invertible() {
        let post = PostProcessor::identity().with_chain("bus", "vm_pu", vec![TransformSpec::Abs]);
        assert!(!post.is_invertible());
        match post.inverse(&bus_column(vec![1.0])) {
            Err(VoltCoreError::InverseUndefined { class, feature, kind }) => {
                assert_eq!((class.as_str(), feature.as_str(), kind.as_str()), ("bus", "vm_pu", "abs"));
            }
            other => panic!("expected inverse error, got {other:?}"),
        }
    }

    #[test]
    fn test_absent_chain_is_identity() {
        let post = PostProcessor::identity().with_chain("gen", "p_mw", vec![TransformSpec::Exp]);
        let input = bus_column(vec![-1.0, 2.0]);
        assert_eq!(post.apply(&input), input);
    }

    #[test]
    fn test_json_form() {
        let post: PostProcessor = serde_json::from_str(
            r#"{"bus": {"vm_pu": [{"kind": "affine", "offset": 1.0}, {"kind": "tanh"}]}}"#,
        )
        .unwrap();
        assert_eq!(
            post.chain("bus", "vm_pu"),
            [TransformSpec::affine(1.0, 1.0), TransformSpec::Tanh]
        );
    }

    #[test]
    fn test_inverse_outside_range_is_an_error() {
        assert_eq!(TransformSpec::Exp.inverse(-1.0), None);
        assert_eq!(TransformSpec::Tanh.inverse(1.0), None);
        assert!(TransformSpec::Tanh.inverse(0.5).is_some());

        let post = PostProcessor::identity().with_chain(
            "bus",
            "vm_pu",
            vec![TransformSpec::Exp, TransformSpec::affine(-1.0, 1.0)],
        );
        // exp(x) - 1 > -1, so -2 cannot come from this chain
        let err = post.inverse(&bus_column(vec![0.5, -2.0])).unwrap_err();
        assert!(matches!(
            err,
            VoltCoreError::InverseOutOfDomain { ref kind, value, .. } if kind == "exp" && value == -1.0
        ));
        let back = post.inverse(&bus_column(vec![0.0])).unwrap();
        assert_eq!(back["bus"]["vm_pu"], vec![0.0]);
    }
}

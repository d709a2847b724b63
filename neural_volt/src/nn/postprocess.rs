//! Post-processing chains on flat prediction tensors.
//!
//! Training computes the loss on post-processed predictions, so the chains
//! must run on tensors and stay differentiable.

use burn::prelude::*;
use volt_core::{PostProcessor, Segment, TransformSpec};

/// Apply one transform elementwise.
pub fn apply_transform<B: Backend, const D: usize>(
    spec: &TransformSpec,
    x: Tensor<B, D>,
) -> Tensor<B, D> {
    match *spec {
        TransformSpec::Affine { offset, scale } => x.mul_scalar(scale).add_scalar(offset),
        TransformSpec::Exp => x.exp(),
        TransformSpec::Tanh => x.tanh(),
        TransformSpec::Abs => x.abs(),
    }
}

/// Apply a chain left to right.
pub fn apply_chain<B: Backend, const D: usize>(
    chain: &[TransformSpec],
    x: Tensor<B, D>,
) -> Tensor<B, D> {
    chain.iter().fold(x, |x, spec| apply_transform(spec, x))
}

/// Apply `post` to the columns of a `[n, len]` tensor laid out by `layout`.
///
/// Segments without a chain pass through unchanged.
pub fn postprocess_flat<B: Backend>(
    post: &PostProcessor,
    layout: &[Segment],
    x: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let has_chain = layout
        .iter()
        .any(|s| !post.chain(&s.class, &s.feature).is_empty());
    if !has_chain {
        return x;
    }

    let [n, _] = x.dims();
    let parts: Vec<Tensor<B, 2>> = layout
        .iter()
        .filter(|s| s.len > 0)
        .map(|s| {
            let columns = x.clone().slice([0..n, s.offset..s.offset + s.len]);
            apply_chain(post.chain(&s.class, &s.feature), columns)
        })
        .collect();
    Tensor::cat(parts, 1)
}

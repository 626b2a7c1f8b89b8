//! Mask-weighted reduction over the context axis.
//!
//! Three reductions share one entry point, [`reduce_masked`]:
//!
//! - no mask: plain mean over the sequence, broadcast back to every position;
//! - padding mask `[batch, seq]`: weighted mean over the sequence, broadcast back;
//! - pairwise mask `[batch, queries, seq]`: one weighted mean per query row.
//!
//! Mask values are multiplicative weights. A row whose weights sum to zero
//! reduces to (near) zero through [`MASK_EPSILON`] instead of failing.

use crate::error::{PomError, Result};
use crate::perf::{self, Metric};
use burn::tensor::{backend::Backend, Bool, DType, Tensor, TensorData};

/// Stabilizer added to every weight sum.
pub const MASK_EPSILON: f32 = 1.0e-7;

/// Caller-supplied weighting of context positions.
#[derive(Debug, Clone)]
pub enum Mask<B: Backend> {
    /// Per-position weights with shape `[batch, seq]`.
    Padding(Tensor<B, 2>),
    /// Per-query weights with shape `[batch, queries, seq]`.
    Pairwise(Tensor<B, 3>),
}

impl<B: Backend> Mask<B> {
    /// Build a mask from raw data, dispatching on its rank.
    ///
    /// Boolean and integer payloads are converted to float weights.
    pub fn from_data(data: TensorData, device: &B::Device) -> Result<Self> {
        let is_bool = data.dtype == DType::Bool;
        match data.shape.len() {
            2 if is_bool => Ok(Self::padding_from_bool(Tensor::from_data(data, device))),
            3 if is_bool => Ok(Self::pairwise_from_bool(Tensor::from_data(data, device))),
            2 => Ok(Self::Padding(Tensor::from_data(data.convert::<f32>(), device))),
            3 => Ok(Self::Pairwise(Tensor::from_data(data.convert::<f32>(), device))),
            rank => Err(PomError::UnsupportedMaskRank { rank }),
        }
    }

    /// Padding mask from a boolean tensor (`true` keeps a position).
    pub fn padding_from_bool(mask: Tensor<B, 2, Bool>) -> Self {
        Self::Padding(mask.float())
    }

    /// Pairwise mask from a boolean tensor (`true` lets a query see a position).
    pub fn pairwise_from_bool(mask: Tensor<B, 3, Bool>) -> Self {
        Self::Pairwise(mask.float())
    }

    /// Tensor rank of the mask.
    pub fn rank(&self) -> usize {
        match self {
            Self::Padding(_) => 2,
            Self::Pairwise(_) => 3,
        }
    }

    /// Length of the reduced output for a context of length `seq`.
    pub fn output_len(&self, seq: usize) -> usize {
        match self {
            Self::Padding(_) => seq,
            Self::Pairwise(mask) => mask.dims()[1],
        }
    }

    /// Check the mask against a `[batch, seq]` context.
    pub fn check(&self, batch: usize, seq: usize) -> Result<()> {
        let (expected, got) = match self {
            Self::Padding(mask) => {
                let dims = mask.dims();
                (vec![batch, seq], dims.to_vec())
            }
            Self::Pairwise(mask) => {
                let dims = mask.dims();
                (vec![batch, dims[1], seq], dims.to_vec())
            }
        };
        if expected != got {
            return Err(PomError::ShapeMismatch {
                op: "reduce_masked",
                expected,
                got,
            });
        }
        Ok(())
    }
}

impl<B: Backend> From<Tensor<B, 2>> for Mask<B> {
    fn from(mask: Tensor<B, 2>) -> Self {
        Self::Padding(mask)
    }
}

impl<B: Backend> From<Tensor<B, 3>> for Mask<B> {
    fn from(mask: Tensor<B, 3>) -> Self {
        Self::Pairwise(mask)
    }
}

/// Unweighted mean over the sequence: `[batch, seq, dim] -> [batch, 1, dim]`.
pub fn mean_mixer<B: Backend>(h: Tensor<B, 3>) -> Tensor<B, 3> {
    h.mean_dim(1)
}

/// Weighted mean under a padding mask: `[batch, seq, dim] -> [batch, 1, dim]`.
pub fn mask_mixer<B: Backend>(h: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 3> {
    let weights = mask.unsqueeze_dim::<3>(2);
    let weighted = h.mul(weights.clone()).sum_dim(1);
    let total = weights.sum_dim(1).add_scalar(MASK_EPSILON);
    weighted.div(total)
}

/// Per-query weighted mean: `[batch, seq, dim] x [batch, queries, seq] -> [batch, queries, dim]`.
pub fn full_mask_mixer<B: Backend>(h: Tensor<B, 3>, mask: Tensor<B, 3>) -> Tensor<B, 3> {
    let weighted = mask.clone().matmul(h);
    let total = mask.sum_dim(2).add_scalar(MASK_EPSILON);
    weighted.div(total)
}

/// Reduce per-position features `h` (`[batch, seq, dim]`) under an optional mask.
///
/// Without a mask or with a padding mask the aggregate is broadcast back to
/// `[batch, seq, dim]`. A pairwise mask yields `[batch, queries, dim]`.
/// Masks are not broadcast: the batch axis must match `h` exactly.
pub fn reduce_masked<B: Backend>(h: Tensor<B, 3>, mask: Option<&Mask<B>>) -> Result<Tensor<B, 3>> {
    let [batch, seq, dim] = h.dims();
    if let Some(mask) = mask {
        mask.check(batch, seq)?;
    }
    let _span = perf::span(Metric::MaskReduce);
    let device = h.device();

    if seq == 0 {
        let out_len = mask.map(|m| m.output_len(seq)).unwrap_or(0);
        return Ok(empty_or_zeros(batch, out_len, dim, &device));
    }

    let reduced = match mask {
        None => mean_mixer(h),
        Some(Mask::Padding(mask)) => mask_mixer(h, mask.clone()),
        Some(Mask::Pairwise(mask)) => return Ok(full_mask_mixer(h, mask.clone())),
    };
    Ok(reduced.expand([batch, seq, dim]))
}

/// Zero-filled `[batch, len, dim]` tensor, allowing zero length.
fn empty_or_zeros<B: Backend>(
    batch: usize,
    len: usize,
    dim: usize,
    device: &B::Device,
) -> Tensor<B, 3> {
    if len == 0 {
        let data: Vec<f32> = Vec::new();
        Tensor::from_data(TensorData::new(data, [batch, len, dim]), device)
    } else {
        Tensor::<B, 3>::zeros([batch, len, dim], device)
    }
}

//! Polynomial aggregation: expansion followed by masked reduction.

use crate::error::Result;
use crate::modules::mask::{reduce_masked, Mask};
use crate::modules::polynomial::{check_coefficients, expand_k};
use burn::tensor::{backend::Backend, Tensor};

/// Expand `x` (`[batch, seq, dim]`) to `order` and reduce it under `mask`.
///
/// Shapes follow [`reduce_masked`]: `[batch, seq, dim]` without a mask or
/// with a padding mask, `[batch, queries, dim]` with a pairwise mask.
pub fn aggregate<B: Backend>(
    x: Tensor<B, 3>,
    coeff: Tensor<B, 2>,
    order: usize,
    mask: Option<&Mask<B>>,
) -> Result<Tensor<B, 3>> {
    let [batch, seq, _] = x.dims();
    check_coefficients(&x.dims(), coeff.dims(), order)?;
    if let Some(mask) = mask {
        mask.check(batch, seq)?;
    }
    if seq == 0 {
        return reduce_masked(x, mask);
    }
    let h = expand_k(x, coeff, order)?;
    reduce_masked(h, mask)
}

/// Functional polynomial mixer over an already projected context.
pub fn pom<B: Backend>(
    context: Tensor<B, 3>,
    coeff: Tensor<B, 2>,
    order: usize,
    mask: Option<&Mask<B>>,
) -> Result<Tensor<B, 3>> {
    aggregate(context, coeff, order, mask)
}

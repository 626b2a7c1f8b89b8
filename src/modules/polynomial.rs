//! Polynomial feature expansion.
//!
//! Each channel of the activated signal `h = gelu(x)` is raised to the powers
//! `1..=k` and contracted against a learned `(channels, k)` coefficient table,
//! giving one scalar feature per position and channel:
//!
//! ```text
//! out[b, n, d] = sum_i coeff[d, i] * h[b, n, d]^(i + 1)
//! ```
//!
//! Orders 2, 3 and 4 have closed forms that multiply the powers straight into
//! the coefficient columns. Every other order goes through the generic path,
//! which stacks the powers along a trailing axis and contracts once.

use crate::error::{PomError, Result};
use crate::perf::{self, Metric};
use burn::tensor::{activation::gelu, backend::Backend, Tensor};

/// Pointwise GELU applied ahead of every expansion path.
pub fn activate<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    gelu(x)
}

/// Expansion path chosen for a polynomial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionPath {
    /// Closed form for order 2.
    Quadratic,
    /// Closed form for order 3.
    Cubic,
    /// Closed form for order 4.
    Quartic,
    /// Stacked powers for any other order.
    Generic(usize),
}

impl ExpansionPath {
    /// Path taken by [`expand_k`] for `order`.
    pub fn for_order(order: usize) -> Self {
        match order {
            2 => Self::Quadratic,
            3 => Self::Cubic,
            4 => Self::Quartic,
            other => Self::Generic(other),
        }
    }

    /// Whether the order has a closed form.
    pub fn is_closed_form(self) -> bool {
        !matches!(self, Self::Generic(_))
    }
}

/// Validate a coefficient table against an input shape and order.
pub fn check_coefficients(
    input_dims: &[usize],
    coeff_dims: [usize; 2],
    order: usize,
) -> Result<()> {
    if order == 0 {
        return Err(PomError::invalid("order", "polynomial order must be at least 1"));
    }
    let [channels, degree] = coeff_dims;
    if degree != order {
        return Err(PomError::DegreeMismatch { order, degree });
    }
    let last = input_dims.last().copied().unwrap_or(0);
    if channels != last {
        return Err(PomError::ShapeMismatch {
            op: "expand_k",
            expected: vec![last, order],
            got: coeff_dims.to_vec(),
        });
    }
    Ok(())
}

/// Expand `x` with shape `[batch, seq, channels]` to order `order`.
///
/// Dispatches through [`ExpansionPath::for_order`]: closed forms for orders
/// 2-4, the [`expand_generic`] path otherwise. The output keeps the input shape.
pub fn expand_k<B: Backend>(
    x: Tensor<B, 3>,
    coeff: Tensor<B, 2>,
    order: usize,
) -> Result<Tensor<B, 3>> {
    check_coefficients(&x.dims(), coeff.dims(), order)?;
    let _span = perf::span(Metric::PolyExpand);
    let out = match ExpansionPath::for_order(order) {
        ExpansionPath::Quadratic => po2(x, &coeff),
        ExpansionPath::Cubic => po3(x, &coeff),
        ExpansionPath::Quartic => po4(x, &coeff),
        ExpansionPath::Generic(order) => stacked_expansion(x, coeff, order),
    };
    Ok(out)
}

/// Expand `x` through the stacked-powers path for any order `>= 1`.
///
/// Powers are built incrementally (`h^i = h^(i-1) * h`) so the terms match the
/// closed forms up to summation order.
pub fn expand_generic<B: Backend>(
    x: Tensor<B, 3>,
    coeff: Tensor<B, 2>,
    order: usize,
) -> Result<Tensor<B, 3>> {
    check_coefficients(&x.dims(), coeff.dims(), order)?;
    let _span = perf::span(Metric::PolyExpand);
    Ok(stacked_expansion(x, coeff, order))
}

fn stacked_expansion<B: Backend>(x: Tensor<B, 3>, coeff: Tensor<B, 2>, order: usize) -> Tensor<B, 3> {
    let [batch, seq, dim] = x.dims();
    let h = activate(x).unsqueeze_dim::<4>(3);

    let mut powers = Vec::with_capacity(order);
    let mut current = h.clone();
    for _ in 1..order {
        let next = current.clone().mul(h.clone());
        powers.push(current);
        current = next;
    }
    powers.push(current);

    let stacked = Tensor::cat(powers, 3);
    let coeff = coeff.reshape([1, 1, dim, order]);
    stacked.mul(coeff).sum_dim(3).reshape([batch, seq, dim])
}

/// Coefficient column `index` shaped for broadcasting over `[batch, seq, dim]`.
fn coeff_column<B: Backend>(coeff: &Tensor<B, 2>, index: usize) -> Tensor<B, 3> {
    let [dim, _] = coeff.dims();
    coeff.clone().narrow(1, index, 1).reshape([1, 1, dim])
}

fn po2<B: Backend>(x: Tensor<B, 3>, coeff: &Tensor<B, 2>) -> Tensor<B, 3> {
    let h = activate(x);
    let h2 = h.clone().mul(h.clone());
    h.mul(coeff_column(coeff, 0))
        .add(h2.mul(coeff_column(coeff, 1)))
}

fn po3<B: Backend>(x: Tensor<B, 3>, coeff: &Tensor<B, 2>) -> Tensor<B, 3> {
    let h = activate(x);
    let h2 = h.clone().mul(h.clone());
    let h3 = h2.clone().mul(h.clone());
    h.mul(coeff_column(coeff, 0))
        .add(h2.mul(coeff_column(coeff, 1)))
        .add(h3.mul(coeff_column(coeff, 2)))
}

fn po4<B: Backend>(x: Tensor<B, 3>, coeff: &Tensor<B, 2>) -> Tensor<B, 3> {
    let h = activate(x);
    let h2 = h.clone().mul(h.clone());
    let h3 = h2.clone().mul(h.clone());
    let h4 = h3.clone().mul(h.clone());
    h.mul(coeff_column(coeff, 0))
        .add(h2.mul(coeff_column(coeff, 1)))
        .add(h3.mul(coeff_column(coeff, 2)))
        .add(h4.mul(coeff_column(coeff, 3)))
}

//! Linear projection helpers for `[batch, seq, dim]` activations.

use crate::error::{PomError, Result};
use crate::perf::{self, Metric};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use burn_nn::Linear;

/// `(in_dim, out_dim)` of a linear layer (burn stores weights as `[in, out]`).
pub fn linear_dims<B: Backend>(linear: &Linear<B>) -> (usize, usize) {
    let [in_dim, out_dim] = linear.weight.val().dims();
    (in_dim, out_dim)
}

/// Apply a linear layer to the last axis of a rank-3 tensor.
pub fn apply_linear_3d<B: Backend>(linear: &Linear<B>, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
    let [batch, seq, in_dim] = input.dims();
    let (expected_in, out_dim) = linear_dims(linear);
    if in_dim != expected_in {
        return Err(PomError::ShapeMismatch {
            op: "apply_linear_3d",
            expected: vec![batch, seq, expected_in],
            got: vec![batch, seq, in_dim],
        });
    }
    let _span = perf::span(Metric::LinearProjection);
    let device = input.device();

    if batch == 0 || seq == 0 {
        return Ok(Tensor::from_data(
            TensorData::new(Vec::<f32>::new(), [batch, seq, out_dim]),
            &device,
        ));
    }

    let reshaped = input.reshape([batch * seq, in_dim]);
    let projected = linear.forward(reshaped);
    Ok(projected.reshape([batch, seq, out_dim]))
}

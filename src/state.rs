//! Streaming state for incremental polynomial aggregation.
//!
//! The state is a plain value owned by the caller: a running aggregate and the
//! number of context positions it summarizes. Each chunk folds in as a
//! weighted mean, so streaming chunks `c1, c2, ...` reproduces the aggregate
//! of their concatenation without keeping any of them around.

use crate::error::{PomError, Result};
use crate::perf::{self, Metric};
use burn::tensor::{backend::Backend, Tensor};

/// Trait implemented by modules that support incremental forwards.
pub trait StreamingModule<B: Backend> {
    /// Concrete state type for this module.
    type State;

    /// Allocate a fresh, empty state for `batch_size` sequences.
    fn init_state(&self, batch_size: usize) -> Self::State;
}

/// Running aggregate carried between streaming calls.
#[derive(Debug, Clone)]
pub struct PomState<B: Backend> {
    /// Running mean of expanded features, shape `[batch, 1, dim]`.
    pub aggregate: Tensor<B, 3>,
    /// Number of context positions folded into `aggregate`.
    pub count: usize,
}

impl<B: Backend> PomState<B> {
    /// Empty state: zero aggregate, zero count.
    pub fn empty(batch_size: usize, dim: usize, device: &B::Device) -> Self {
        Self {
            aggregate: Tensor::zeros([batch_size, 1, dim], device),
            count: 0,
        }
    }

    /// State holding a single chunk aggregate.
    pub fn from_chunk(aggregate: Tensor<B, 3>, count: usize) -> Self {
        Self { aggregate, count }
    }

    /// Whether any context has been folded in yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fold a chunk aggregate over `chunk_len` positions into this state.
    ///
    /// Returns the new state; `self` is left untouched. A zero-length chunk
    /// returns a copy of `self`, or [`PomError::EmptyChunk`] when there is
    /// nothing to carry.
    pub fn merge(&self, chunk: Tensor<B, 3>, chunk_len: usize) -> Result<Self> {
        let expected = self.aggregate.dims();
        let got = chunk.dims();
        if expected != got {
            return Err(PomError::ShapeMismatch {
                op: "PomState::merge",
                expected: expected.to_vec(),
                got: got.to_vec(),
            });
        }

        if chunk_len == 0 {
            if self.is_empty() {
                return Err(PomError::EmptyChunk);
            }
            tracing::warn!(count = self.count, "skipping empty streaming chunk");
            return Ok(self.clone());
        }

        let _span = perf::span(Metric::StreamMerge);
        perf::add_count(Metric::StreamChunks, 1);
        let total = self.count + chunk_len;
        tracing::trace!(past = self.count, current = chunk_len, total, "merging streaming chunk");

        if self.is_empty() {
            return Ok(Self::from_chunk(chunk, chunk_len));
        }

        let past = self.aggregate.clone().mul_scalar(self.count as f32);
        let current = chunk.mul_scalar(chunk_len as f32);
        let aggregate = past.add(current).div_scalar(total as f32);
        Ok(Self {
            aggregate,
            count: total,
        })
    }
}

/// Fold a chunk into an optional prior state.
pub fn merge_state<B: Backend>(
    prior: Option<&PomState<B>>,
    chunk: Tensor<B, 3>,
    chunk_len: usize,
) -> Result<PomState<B>> {
    match prior {
        Some(state) => state.merge(chunk, chunk_len),
        None if chunk_len == 0 => Err(PomError::EmptyChunk),
        None => Ok(PomState::from_chunk(chunk, chunk_len)),
    }
}

//! Compact polynomial mixer layer.
//!
//! `ComPom` replaces attention in a sequence block: the context is projected to
//! `expand * dim` channels, expanded polynomially, averaged over the sequence
//! (under an optional mask) and projected back to `dim`.
//!
//! Two entry points are provided:
//!
//! - [`ComPom::forward`] mixes a whole context in one shot;
//! - [`ComPom::state_forward`] folds context chunk by chunk into a caller-held
//!   [`PomState`], reproducing the one-shot aggregate of everything seen so far.

use crate::config::PomConfig;
use crate::error::{PomError, Result};
use crate::modules::aggregate::aggregate;
use crate::modules::linear::apply_linear_3d;
use crate::modules::mask::Mask;
use crate::perf::{self, Metric};
use crate::state::{merge_state, PomState, StreamingModule};
use crate::weights::{load_compom_state_dict, tensor_from_weight, WeightTensor};
use burn::module::Param;
use burn::tensor::{backend::Backend, Distribution, Tensor};
use burn_nn::{Linear, LinearConfig};
use std::collections::HashMap;

/// Construction parameters for [`ComPom`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComPomConfig {
    /// Model width.
    pub dim: usize,
    /// Number of power terms in the expansion.
    pub degree: usize,
    /// Channel multiplier of the input projection.
    pub expand: usize,
    /// Whether both projections carry a bias.
    pub bias: bool,
    /// Standard deviation of the initial coefficients.
    pub coeff_init_std: f64,
}

impl ComPomConfig {
    /// Create a config with biases and the default coefficient scale.
    pub fn new(dim: usize, degree: usize, expand: usize) -> Self {
        Self {
            dim,
            degree,
            expand,
            bias: true,
            coeff_init_std: 0.02,
        }
    }

    /// Enable or disable projection biases.
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Set the coefficient initialization scale.
    pub fn with_coeff_init_std(mut self, std: f64) -> Self {
        self.coeff_init_std = std;
        self
    }

    /// Width of the expanded feature space.
    pub fn hidden_dim(&self) -> usize {
        self.dim * self.expand
    }

    /// Reject degenerate layer shapes.
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(PomError::invalid("dim", "must be positive"));
        }
        if self.expand == 0 {
            return Err(PomError::invalid("expand", "must be positive"));
        }
        if self.degree < 2 {
            return Err(PomError::invalid(
                "degree",
                format!("must be at least 2, got {}", self.degree),
            ));
        }
        if !self.coeff_init_std.is_finite() || self.coeff_init_std < 0.0 {
            return Err(PomError::invalid(
                "coeff_init_std",
                format!("must be finite and non-negative, got {}", self.coeff_init_std),
            ));
        }
        Ok(())
    }

    /// Initialize a layer on the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ComPom<B>> {
        ComPom::new(self, device)
    }
}

impl From<&PomConfig> for ComPomConfig {
    fn from(config: &PomConfig) -> Self {
        Self {
            dim: config.dim,
            degree: config.degree,
            expand: config.expand,
            bias: config.bias,
            coeff_init_std: config.coeff_init_std,
        }
    }
}

/// Polynomial mixer with input projection, coefficients and output projection.
#[derive(Debug, Clone)]
pub struct ComPom<B: Backend> {
    /// Model width.
    pub dim: usize,
    /// Polynomial order.
    pub order: usize,
    /// Channel multiplier of the input projection.
    pub order_expand: usize,
    /// `dim -> expand * dim` projection.
    pub po_proj: Linear<B>,
    /// Coefficients with shape `[expand * dim, order]`.
    pub po_coeff: Param<Tensor<B, 2>>,
    /// `expand * dim -> dim` projection.
    pub ag_proj: Linear<B>,
}

impl<B: Backend> ComPom<B> {
    /// Construct a freshly initialized layer.
    pub fn new(config: &ComPomConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let hidden = config.hidden_dim();

        let po_proj = LinearConfig::new(config.dim, hidden)
            .with_bias(config.bias)
            .init::<B>(device);
        let ag_proj = LinearConfig::new(hidden, config.dim)
            .with_bias(config.bias)
            .init::<B>(device);
        let coeff = Tensor::<B, 2>::random(
            [hidden, config.degree],
            Distribution::Normal(0.0, config.coeff_init_std),
            device,
        );

        tracing::debug!(
            dim = config.dim,
            degree = config.degree,
            expand = config.expand,
            bias = config.bias,
            "initialized polynomial mixer"
        );

        Ok(Self {
            dim: config.dim,
            order: config.degree,
            order_expand: config.expand,
            po_proj,
            po_coeff: Param::from_tensor(coeff),
            ag_proj,
        })
    }

    /// Build a layer from a loaded config, importing its checkpoint if set.
    pub fn from_config(config: &PomConfig, device: &B::Device) -> anyhow::Result<Self> {
        let mut layer = Self::new(&ComPomConfig::from(config), device)?;
        if let Some(path) = &config.weights_path {
            let prefix = config.weights_prefix.as_deref().unwrap_or("");
            let state = load_compom_state_dict(path, prefix)?;
            layer.load_state_dict(&state)?;
            tracing::debug!(path = %path, prefix, "loaded mixer weights");
        }
        Ok(layer)
    }

    /// Width of the expanded feature space.
    pub fn hidden_dim(&self) -> usize {
        self.dim * self.order_expand
    }

    /// Replace all parameters with checkpoint tensors keyed by bare name.
    ///
    /// Every tensor is shape-checked against the layer before anything is
    /// assigned.
    pub fn load_state_dict(&mut self, state: &HashMap<String, WeightTensor>) -> anyhow::Result<()> {
        let device = self.po_coeff.val().device();
        let hidden = self.hidden_dim();

        let po_proj = load_linear(&self.po_proj, state, "po_proj", self.dim, hidden, &device)?;
        let ag_proj = load_linear(&self.ag_proj, state, "ag_proj", hidden, self.dim, &device)?;
        let coeff: Tensor<B, 2> = tensor_from_weight(require(state, "po_coeff")?, &device)?;
        if coeff.dims() != [hidden, self.order] {
            anyhow::bail!(
                "po_coeff has shape {:?}, layer expects {:?}",
                coeff.dims(),
                [hidden, self.order]
            );
        }

        self.po_proj = po_proj;
        self.ag_proj = ag_proj;
        self.po_coeff = Param::from_tensor(coeff);
        Ok(())
    }

    /// Resolve the mixed sequence: `context`, or `query` for self-mixing.
    fn select_context(&self, query: Tensor<B, 3>, context: Option<Tensor<B, 3>>) -> Result<Tensor<B, 3>> {
        let context = context.unwrap_or(query);
        let [batch, seq, dim] = context.dims();
        if dim != self.dim {
            return Err(PomError::ShapeMismatch {
                op: "ComPom::context",
                expected: vec![batch, seq, self.dim],
                got: vec![batch, seq, dim],
            });
        }
        Ok(context)
    }

    /// Mix `context` (or `query` when no context is given) in one shot.
    ///
    /// `query` only stands in for a missing context; it does not condition the
    /// aggregate. The output is `[batch, context_len, dim]`, or
    /// `[batch, queries, dim]` under a pairwise mask.
    pub fn forward(
        &self,
        query: Tensor<B, 3>,
        context: Option<Tensor<B, 3>>,
        mask: Option<&Mask<B>>,
    ) -> Result<Tensor<B, 3>> {
        let context = self.select_context(query, context)?;
        let [batch, seq, _] = context.dims();
        if let Some(mask) = mask {
            mask.check(batch, seq)?;
        }
        let _span = perf::span(Metric::PomForward);
        perf::add_count(Metric::PomTokens, seq as u64);

        let hidden = apply_linear_3d(&self.po_proj, context)?;
        let mixed = aggregate(hidden, self.po_coeff.val(), self.order, mask)?;
        apply_linear_3d(&self.ag_proj, mixed)
    }

    /// Fold one context chunk into `state` and project the running aggregate.
    ///
    /// Returns the `[batch, 1, dim]` output and the new state, whose aggregate
    /// stays in the expanded `[batch, 1, expand * dim]` space. `state` itself
    /// is not modified.
    pub fn state_forward(
        &self,
        query: Tensor<B, 3>,
        context: Option<Tensor<B, 3>>,
        state: Option<&PomState<B>>,
    ) -> Result<(Tensor<B, 3>, PomState<B>)> {
        let context = self.select_context(query, context)?;
        let [batch, chunk_len, _] = context.dims();
        let hidden_dim = self.hidden_dim();
        if let Some(state) = state {
            let expected = [batch, 1, hidden_dim];
            if state.aggregate.dims() != expected {
                return Err(PomError::ShapeMismatch {
                    op: "ComPom::state_forward",
                    expected: expected.to_vec(),
                    got: state.aggregate.dims().to_vec(),
                });
            }
        } else if chunk_len == 0 {
            return Err(PomError::EmptyChunk);
        }
        let _span = perf::span(Metric::PomStateForward);

        let next = if chunk_len == 0 {
            let placeholder = Tensor::zeros([batch, 1, hidden_dim], &context.device());
            merge_state(state, placeholder, 0)?
        } else {
            perf::add_count(Metric::PomTokens, chunk_len as u64);
            let hidden = apply_linear_3d(&self.po_proj, context)?;
            let chunk = aggregate(hidden, self.po_coeff.val(), self.order, None)?.narrow(1, 0, 1);
            merge_state(state, chunk, chunk_len)?
        };

        let output = apply_linear_3d(&self.ag_proj, next.aggregate.clone())?;
        Ok((output, next))
    }
}

impl<B: Backend> StreamingModule<B> for ComPom<B> {
    type State = PomState<B>;

    /// Zero aggregate with zero count in the expanded feature space.
    fn init_state(&self, batch_size: usize) -> Self::State {
        let device = self.po_coeff.val().device();
        PomState::empty(batch_size, self.hidden_dim(), &device)
    }
}

fn require<'a>(state: &'a HashMap<String, WeightTensor>, name: &str) -> anyhow::Result<&'a WeightTensor> {
    state
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("Missing weight {name}"))
}

/// Rebuild `linear` from `[out, in]` checkpoint weights.
fn load_linear<B: Backend>(
    linear: &Linear<B>,
    state: &HashMap<String, WeightTensor>,
    name: &str,
    in_dim: usize,
    out_dim: usize,
    device: &B::Device,
) -> anyhow::Result<Linear<B>> {
    let weight: Tensor<B, 2> = tensor_from_weight(require(state, &format!("{name}.weight"))?, device)?;
    if weight.dims() != [out_dim, in_dim] {
        anyhow::bail!(
            "{name}.weight has shape {:?}, layer expects {:?}",
            weight.dims(),
            [out_dim, in_dim]
        );
    }

    let mut loaded = linear.clone();
    loaded.weight = Param::from_tensor(weight.transpose());
    match (linear.bias.is_some(), state.get(&format!("{name}.bias"))) {
        (true, Some(bias)) => {
            let bias: Tensor<B, 1> = tensor_from_weight(bias, device)?;
            if bias.dims() != [out_dim] {
                anyhow::bail!("{name}.bias has shape {:?}, layer expects [{out_dim}]", bias.dims());
            }
            loaded.bias = Some(Param::from_tensor(bias));
        }
        (true, None) => anyhow::bail!("Missing weight {name}.bias"),
        (false, Some(_)) => {
            anyhow::bail!("Checkpoint carries {name}.bias but the layer has no bias")
        }
        (false, None) => {}
    }
    Ok(loaded)
}

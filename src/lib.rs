//! # compom - Polynomial Mixer sequence layer
//!
//! A Rust implementation of the Polynomial Mixer (PoM), a drop-in replacement
//! for attention in sequence models, built on [`burn`] tensors.
//!
//! ## Architecture Overview
//!
//! Context flows through four stages:
//!
//! 1. **Input projection**: `dim -> expand * dim` ([`ComPom::po_proj`]).
//! 2. **Polynomial expansion**: GELU, then powers `1..=k` contracted against a
//!    learned `(expand * dim, k)` coefficient table ([`modules::polynomial`]).
//! 3. **Aggregation**: mean over the context, optionally weighted by a padding
//!    or pairwise [`Mask`] ([`modules::mask`]).
//! 4. **Output projection**: `expand * dim -> dim` ([`ComPom::ag_proj`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use burn::tensor::Tensor;
//! use burn_ndarray::{NdArray, NdArrayDevice};
//! use compom::ComPomConfig;
//!
//! let device = NdArrayDevice::default();
//! let layer = ComPomConfig::new(64, 3, 2).init::<NdArray<f32>>(&device).unwrap();
//!
//! let x = Tensor::<NdArray<f32>, 3>::zeros([2, 16, 64], &device);
//! let y = layer.forward(x, None, None).unwrap();
//! assert_eq!(y.dims(), [2, 16, 64]);
//! ```
//!
//! ## Streaming
//!
//! The aggregate is a running mean, so context can arrive in chunks. The
//! caller owns the [`PomState`] and threads it through successive calls:
//!
//! ```no_run
//! # use burn::tensor::Tensor;
//! # use burn_ndarray::{NdArray, NdArrayDevice};
//! # use compom::ComPomConfig;
//! # let device = NdArrayDevice::default();
//! # let layer = ComPomConfig::new(64, 3, 2).init::<NdArray<f32>>(&device).unwrap();
//! let mut state = None;
//! for _ in 0..4 {
//!     let chunk = Tensor::<NdArray<f32>, 3>::zeros([1, 8, 64], &device);
//!     let (out, next) = layer.state_forward(chunk, None, state.as_ref()).unwrap();
//!     assert_eq!(out.dims(), [1, 1, 64]);
//!     state = Some(next);
//! }
//! assert_eq!(state.unwrap().count, 32);
//! ```
//!
//! ## Configuration
//!
//! Layers can be described in YAML and optionally paired with a SafeTensors
//! checkpoint; see [`PomConfig`] and [`ComPom::from_config`].

pub mod config;
pub mod error;
pub mod model;
pub mod modules;
pub mod perf;
pub mod state;
pub mod weights;

pub use config::{load_config, PomConfig};
pub use error::{PomError, Result};
pub use model::compom::{ComPom, ComPomConfig};
pub use modules::aggregate::{aggregate, pom};
pub use modules::mask::{reduce_masked, Mask};
pub use modules::polynomial::{activate, expand_generic, expand_k, ExpansionPath};
pub use state::{PomState, StreamingModule};

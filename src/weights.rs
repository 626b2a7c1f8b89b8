//! SafeTensors loading for mixer checkpoints.
//!
//! Checkpoints use the reference parameter names (`po_proj.weight`,
//! `po_proj.bias`, `po_coeff`, `ag_proj.weight`, `ag_proj.bias`), possibly
//! nested under a model prefix such as `blocks.3.mixer.`. Linear weights are
//! stored `[out, in]`.

use crate::perf::{self, Metric};
use anyhow::Result;
use burn::tensor::{backend::Backend, Tensor, TensorData as BurnTensorData};
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Parameter names making up one mixer layer.
pub const COMPOM_PARAMS: &[&str] = &[
    "po_proj.weight",
    "po_proj.bias",
    "po_coeff",
    "ag_proj.weight",
    "ag_proj.bias",
];

/// Raw tensor payload extracted from a SafeTensors file.
#[derive(Debug, Clone)]
pub struct WeightTensor {
    /// Scalar dtype in the file.
    pub dtype: Dtype,
    /// Shape as a list of dimensions.
    pub shape: Vec<usize>,
    /// Raw byte buffer in row-major order.
    pub data: Vec<u8>,
}

impl WeightTensor {
    /// Copy a tensor view out of a SafeTensors buffer.
    pub fn from_safetensor(tensor: safetensors::tensor::TensorView<'_>) -> Self {
        Self {
            dtype: tensor.dtype(),
            shape: tensor.shape().to_vec(),
            data: tensor.data().to_vec(),
        }
    }

    /// Decode the payload into f32 values.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        let values = match self.dtype {
            Dtype::F32 => self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            Dtype::BF16 => self
                .data
                .chunks_exact(2)
                .map(|c| f32::from_bits((u16::from_le_bytes([c[0], c[1]]) as u32) << 16))
                .collect(),
            other => anyhow::bail!("Unsupported dtype {other:?}"),
        };
        Ok(values)
    }
}

/// Load a mixer checkpoint from disk, keeping the layer under `prefix`.
pub fn load_compom_state_dict(
    path: impl AsRef<Path>,
    prefix: &str,
) -> Result<HashMap<String, WeightTensor>> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| anyhow::anyhow!("reading weights {}: {e}", path.display()))?;
    parse_compom_state_dict(&bytes, prefix)
}

/// Parse a SafeTensors buffer, keeping the layer under `prefix`.
///
/// Names outside the prefix and names that are not mixer parameters are
/// ignored. The returned map is keyed by bare parameter name.
pub fn parse_compom_state_dict(
    bytes: &[u8],
    prefix: &str,
) -> Result<HashMap<String, WeightTensor>> {
    let _span = perf::span(Metric::WeightsLoad);
    let tensors = SafeTensors::deserialize(bytes)?;
    let mut state = HashMap::new();

    for name in tensors.names() {
        if let Some(mapped) = map_compom_name(name, prefix) {
            let tensor = tensors.tensor(name)?;
            state.insert(mapped, WeightTensor::from_safetensor(tensor));
        }
    }

    if state.is_empty() {
        anyhow::bail!("No mixer parameters found under prefix {prefix:?}");
    }
    tracing::debug!(prefix, tensors = state.len(), "parsed mixer checkpoint");
    Ok(state)
}

/// Map a checkpoint name to a bare parameter name.
fn map_compom_name(name: &str, prefix: &str) -> Option<String> {
    let rest = name.strip_prefix(prefix)?;
    let rest = rest.strip_prefix("module.").unwrap_or(rest);
    COMPOM_PARAMS
        .iter()
        .find(|param| **param == rest)
        .map(|param| param.to_string())
}

/// Convert a weight payload into a tensor of rank `D`, checking its shape.
pub fn tensor_from_weight<B: Backend, const D: usize>(
    tensor: &WeightTensor,
    device: &B::Device,
) -> Result<Tensor<B, D>> {
    let shape: [usize; D] = tensor
        .shape
        .clone()
        .try_into()
        .map_err(|_| anyhow::anyhow!("Expected {D}D tensor, got shape {:?}", tensor.shape))?;
    let values = tensor.to_f32_vec()?;
    let expected: usize = shape.iter().product();
    if values.len() != expected {
        anyhow::bail!(
            "Weight payload has {} values, shape {:?} needs {expected}",
            values.len(),
            tensor.shape
        );
    }
    Ok(Tensor::from_data(BurnTensorData::new(values, shape), device))
}

//! Shared test utilities for tensor construction and comparison.
#![allow(dead_code)]

use burn::tensor::{Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};

pub type TestBackend = NdArray<f32>;

pub const FIXTURE_DIR: &str = "tests/fixtures";

/// Assert two tensors are element-wise close within a relative tolerance.
pub fn assert_close<const D: usize>(a: Tensor<TestBackend, D>, b: Tensor<TestBackend, D>, tol: f32) {
    assert_eq!(a.dims(), b.dims(), "shape mismatch");
    let a = a.into_data().to_vec::<f32>().expect("a values");
    let b = b.into_data().to_vec::<f32>().expect("b values");
    for (idx, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let scale = x.abs().max(y.abs()).max(1.0);
        if (x - y).abs() > tol * scale {
            panic!(
                "mismatch at {idx}: {x} vs {y} (diff: {}, tol: {tol})",
                (x - y).abs()
            );
        }
    }
}

/// Flatten a tensor into a Vec.
pub fn values<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
    tensor.into_data().to_vec::<f32>().expect("f32 values")
}

/// Deterministic values in `[-2, 2]` with shape `[d0, d1, d2]`.
pub fn ramp3(shape: [usize; 3], seed: u32, device: &NdArrayDevice) -> Tensor<TestBackend, 3> {
    let len = shape.iter().product::<usize>();
    let data: Vec<f32> = (0..len)
        .map(|i| {
            let phase = (i as f32 + 1.0) * 0.37 + seed as f32 * 1.13;
            2.0 * phase.sin()
        })
        .collect();
    Tensor::from_data(TensorData::new(data, shape), device)
}

/// Deterministic coefficient table with shape `[dim, degree]`.
pub fn coeffs(dim: usize, degree: usize, device: &NdArrayDevice) -> Tensor<TestBackend, 2> {
    let data: Vec<f32> = (0..dim * degree)
        .map(|i| 0.5 * ((i as f32) * 0.71 + 0.3).cos())
        .collect();
    Tensor::from_data(TensorData::new(data, [dim, degree]), device)
}

/// Create a 2D tensor from nested Vecs.
pub fn tensor2(data: Vec<Vec<f32>>, device: &NdArrayDevice) -> Tensor<TestBackend, 2> {
    let rows = data.len();
    let cols = data.first().map(|r| r.len()).unwrap_or(0);
    let flat: Vec<f32> = data.into_iter().flatten().collect();
    Tensor::from_data(TensorData::new(flat, [rows, cols]), device)
}

/// Build an in-memory SafeTensors buffer from f32 tensors.
pub fn safetensors_bytes(tensors: &[(&str, Vec<usize>, Vec<f32>)]) -> Vec<u8> {
    let mut header = serde_json::Map::new();
    let mut payload = Vec::new();
    for (name, shape, data) in tensors {
        let start = payload.len();
        for value in data {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        header.insert(
            name.to_string(),
            serde_json::json!({
                "dtype": "F32",
                "shape": shape,
                "data_offsets": [start, payload.len()],
            }),
        );
    }
    let mut header = serde_json::to_vec(&serde_json::Value::Object(header)).expect("header");
    while header.len() % 8 != 0 {
        header.push(b' ');
    }
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&payload);
    bytes
}

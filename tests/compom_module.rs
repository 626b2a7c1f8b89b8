mod common;

use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArrayDevice;
use common::{assert_close, ramp3, safetensors_bytes, values, TestBackend, FIXTURE_DIR};
use compom::config::load_config;
use compom::modules::polynomial::activate;
use compom::weights::parse_compom_state_dict;
use compom::{ComPom, ComPomConfig, Mask};

fn layer(device: &NdArrayDevice) -> ComPom<TestBackend> {
    ComPomConfig::new(4, 3, 2)
        .with_coeff_init_std(0.5)
        .init::<TestBackend>(device)
        .expect("layer")
}

/// dim 2, expand 1, degree 2 with identity projections and a known checkpoint.
fn identity_checkpoint(prefix: &str) -> Vec<u8> {
    let names: Vec<String> = ["po_proj.weight", "po_proj.bias", "po_coeff", "ag_proj.weight", "ag_proj.bias"]
        .iter()
        .map(|param| format!("{prefix}{param}"))
        .collect();
    safetensors_bytes(&[
        (names[0].as_str(), vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]),
        (names[1].as_str(), vec![2], vec![0.0, 0.0]),
        (names[2].as_str(), vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]),
        (names[3].as_str(), vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]),
        (names[4].as_str(), vec![2], vec![1.0, -1.0]),
        ("blocks.9.norm.weight", vec![2], vec![1.0, 1.0]),
    ])
}

#[test]
fn self_mixing_keeps_sequence_shape() {
    let device = NdArrayDevice::default();
    let layer = layer(&device);
    let out = layer.forward(ramp3([2, 5, 4], 0, &device), None, None).unwrap();
    assert_eq!(out.dims(), [2, 5, 4]);
}

#[test]
fn output_follows_context_length() {
    let device = NdArrayDevice::default();
    let layer = layer(&device);
    let query = ramp3([2, 3, 4], 1, &device);
    let context = ramp3([2, 7, 4], 2, &device);

    let out = layer.forward(query.clone(), Some(context.clone()), None).unwrap();
    assert_eq!(out.dims(), [2, 7, 4]);

    let padding = Mask::Padding(Tensor::<TestBackend, 2>::ones([2, 7], &device));
    let out = layer.forward(query.clone(), Some(context.clone()), Some(&padding)).unwrap();
    assert_eq!(out.dims(), [2, 7, 4]);

    let pairwise = Mask::Pairwise(Tensor::<TestBackend, 3>::ones([2, 3, 7], &device));
    let out = layer.forward(query, Some(context), Some(&pairwise)).unwrap();
    assert_eq!(out.dims(), [2, 3, 4]);
}

#[test]
fn missing_context_mixes_the_query() {
    let device = NdArrayDevice::default();
    let layer = layer(&device);
    let x = ramp3([1, 6, 4], 3, &device);
    let implicit = layer.forward(x.clone(), None, None).unwrap();
    let explicit = layer.forward(x.clone(), Some(x), None).unwrap();
    assert_close(implicit, explicit, 0.0);
}

#[test]
fn query_does_not_condition_the_mix() {
    let device = NdArrayDevice::default();
    let layer = layer(&device);
    let context = ramp3([1, 6, 4], 4, &device);
    let a = layer
        .forward(ramp3([1, 6, 4], 5, &device), Some(context.clone()), None)
        .unwrap();
    let b = layer
        .forward(ramp3([1, 6, 4], 6, &device), Some(context), None)
        .unwrap();
    assert_close(a, b, 0.0);
}

#[test]
fn mask_shape_is_checked_before_projection() {
    let device = NdArrayDevice::default();
    let layer = layer(&device);
    let mask = Mask::Padding(Tensor::<TestBackend, 2>::ones([1, 3], &device));
    let err = layer
        .forward(ramp3([1, 5, 4], 0, &device), None, Some(&mask))
        .unwrap_err();
    assert!(err.to_string().contains("reduce_masked"));
}

#[test]
fn config_fixture_builds_layer() {
    let config = load_config(format!("{FIXTURE_DIR}/compom_config.yaml")).expect("config");
    assert_eq!((config.dim, config.degree, config.expand), (4, 3, 2));
    let device = NdArrayDevice::default();
    let layer = ComPom::<TestBackend>::from_config(&config, &device).expect("layer");
    assert_eq!(layer.hidden_dim(), 8);
    assert_eq!(layer.po_coeff.val().dims(), [8, 3]);
}

#[test]
fn checkpoint_loads_and_drives_forward() {
    let device = NdArrayDevice::default();
    let state = parse_compom_state_dict(&identity_checkpoint("blocks.0.mixer."), "blocks.0.mixer.")
        .expect("parse");
    assert_eq!(state.len(), 5);

    let mut layer = ComPomConfig::new(2, 2, 1).init::<TestBackend>(&device).unwrap();
    layer.load_state_dict(&state).expect("load");

    let x = Tensor::<TestBackend, 3>::from_floats([[[0.5, -1.0], [1.5, 2.0], [-0.5, 0.25]]], &device);
    let h = values(activate(x.clone()));
    let mean_h0 = (h[0] + h[2] + h[4]) / 3.0;
    let mean_h1_sq = (h[1] * h[1] + h[3] * h[3] + h[5] * h[5]) / 3.0;

    let out = values(layer.forward(x, None, None).unwrap());
    for row in out.chunks(2) {
        assert!((row[0] - (mean_h0 + 1.0)).abs() < 1e-5, "{row:?}");
        assert!((row[1] - (mean_h1_sq - 1.0)).abs() < 1e-5, "{row:?}");
    }
}

#[test]
fn checkpoint_linear_weights_are_transposed() {
    let device = NdArrayDevice::default();
    let bytes = safetensors_bytes(&[
        ("po_proj.weight", vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]),
        ("po_coeff", vec![2, 2], vec![0.0; 4]),
        ("ag_proj.weight", vec![2, 2], vec![0.0; 4]),
    ]);
    let state = parse_compom_state_dict(&bytes, "").unwrap();
    let mut layer = ComPomConfig::new(2, 2, 1)
        .with_bias(false)
        .init::<TestBackend>(&device)
        .unwrap();
    layer.load_state_dict(&state).unwrap();
    let expected = Tensor::<TestBackend, 2>::from_data(
        TensorData::new(vec![1.0_f32, 3.0, 2.0, 4.0], [2, 2]),
        &device,
    );
    assert_close(layer.po_proj.weight.val(), expected, 0.0);
}

#[test]
fn checkpoint_shape_mismatch_is_rejected() {
    let device = NdArrayDevice::default();
    let bytes = safetensors_bytes(&[
        ("po_proj.weight", vec![2, 2], vec![0.0; 4]),
        ("po_proj.bias", vec![2], vec![0.0; 2]),
        ("po_coeff", vec![2, 3], vec![0.0; 6]),
        ("ag_proj.weight", vec![2, 2], vec![0.0; 4]),
        ("ag_proj.bias", vec![2], vec![0.0; 2]),
    ]);
    let state = parse_compom_state_dict(&bytes, "").unwrap();
    let mut layer = ComPomConfig::new(2, 2, 1).init::<TestBackend>(&device).unwrap();
    let err = layer.load_state_dict(&state).unwrap_err();
    assert!(err.to_string().contains("po_coeff"));
}

#[test]
fn checkpoint_missing_bias_is_rejected() {
    let device = NdArrayDevice::default();
    let bytes = safetensors_bytes(&[
        ("po_proj.weight", vec![2, 2], vec![0.0; 4]),
        ("po_coeff", vec![2, 2], vec![0.0; 4]),
        ("ag_proj.weight", vec![2, 2], vec![0.0; 4]),
    ]);
    let state = parse_compom_state_dict(&bytes, "").unwrap();
    let mut layer = ComPomConfig::new(2, 2, 1).init::<TestBackend>(&device).unwrap();
    let err = layer.load_state_dict(&state).unwrap_err();
    assert!(err.to_string().contains("po_proj.bias"));
}

#[test]
fn config_with_weights_path_loads_checkpoint() {
    let dir = std::env::temp_dir().join(format!("compom-weights-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("mixer.safetensors"), identity_checkpoint("blocks.0.mixer.")).unwrap();
    std::fs::write(
        dir.join("layer.yaml"),
        "dim: 2\ndegree: 2\nexpand: 1\nweights_path: mixer.safetensors\nweights_prefix: blocks.0.mixer.\n",
    )
    .unwrap();

    let config = load_config(dir.join("layer.yaml")).expect("config");
    let device = NdArrayDevice::default();
    let layer = ComPom::<TestBackend>::from_config(&config, &device).expect("layer");
    let bias = values(layer.ag_proj.bias.as_ref().expect("bias").val());
    assert_eq!(bias, vec![1.0, -1.0]);

    std::fs::remove_dir_all(&dir).ok();
}

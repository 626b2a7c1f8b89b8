//! Configuration for the polynomial mixer layer.
//!
//! Configurations are typically loaded from YAML files using [`load_config`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Layer hyperparameters and optional checkpoint location.
///
/// # Example YAML
///
/// ```yaml
/// dim: 512
/// degree: 3
/// expand: 2
/// bias: true
/// weights_path: "checkpoints/mixer.safetensors"
/// weights_prefix: "blocks.0.mixer."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PomConfig {
    /// Model width.
    pub dim: usize,
    /// Number of power terms in the expansion.
    pub degree: usize,
    /// Channel multiplier applied by the input projection.
    pub expand: usize,
    /// Whether both projections carry a bias.
    #[serde(default = "default_bias")]
    pub bias: bool,
    /// Standard deviation of the initial coefficients.
    #[serde(default = "default_coeff_init_std")]
    pub coeff_init_std: f64,
    /// Optional SafeTensors checkpoint, relative to the config file.
    #[serde(default)]
    pub weights_path: Option<String>,
    /// Key prefix of the layer inside the checkpoint.
    #[serde(default)]
    pub weights_prefix: Option<String>,
}

fn default_bias() -> bool {
    true
}

fn default_coeff_init_std() -> f64 {
    0.02
}

impl PomConfig {
    /// Config with default bias and initialization and no checkpoint.
    pub fn new(dim: usize, degree: usize, expand: usize) -> Self {
        Self {
            dim,
            degree,
            expand,
            bias: default_bias(),
            coeff_init_std: default_coeff_init_std(),
            weights_path: None,
            weights_prefix: None,
        }
    }
}

/// Load a layer configuration from a YAML file.
///
/// A relative `weights_path` is resolved against the config file location.
///
/// # Errors
///
/// Returns an error if the file doesn't exist or contains invalid YAML.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<PomConfig> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let mut config: PomConfig = serde_yaml::from_str(&data)?;
    if let Some(weights) = config.weights_path.take() {
        let resolved = resolve_relative_path(path, &weights);
        config.weights_path = Some(resolved.to_string_lossy().into_owned());
    }
    Ok(config)
}

/// Resolve a possibly relative path against a config file location.
pub fn resolve_relative_path(config_path: &Path, maybe_relative: &str) -> PathBuf {
    let candidate = Path::new(maybe_relative);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(candidate)
}

//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL_NAME: &str = "BAAI/bge-m3";

/// Dimension of [`DEFAULT_MODEL_NAME`]; used only when probing the model fails.
pub const DEFAULT_FALLBACK_DIMENSION: usize = 1024;

/// Execution device for model inference.
///
/// Inference is CPU-only; there is deliberately no GPU variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
}

impl FromStr for Device {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            other => Err(EmbedError::invalid_config(format!(
                "unsupported execution device '{other}': only 'cpu' is available"
            ))),
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// Configuration for embedding models
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(default)]
pub struct EmbedConfig {
    /// Model identifier: a fastembed model code or a HuggingFace repository
    #[builder(default = "DEFAULT_MODEL_NAME.to_string()")]
    pub model_name: String,
    /// Dimension assumed when the model cannot be probed
    #[builder(default = "DEFAULT_FALLBACK_DIMENSION")]
    pub fallback_dimension: usize,
    /// Execution device
    #[builder(default)]
    pub device: Device,
    /// Directory where downloaded model files are cached
    #[builder(default = r#"PathBuf::from(".studyrag/models")"#)]
    pub cache_dir: PathBuf,
    /// Maximum number of texts per inference call
    #[builder(default = "16")]
    pub batch_size: usize,
    /// ONNX file inside a HuggingFace repository (non built-in models only)
    #[builder(default = r#""onnx/model.onnx".to_string()"#)]
    pub onnx_file: String,
    /// HuggingFace revision/branch (non built-in models only)
    #[builder(default = r#""main".to_string()"#)]
    pub hf_revision: String,
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Default configuration for the given model identifier
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set the fallback dimension (builder style)
    pub fn with_fallback_dimension(self, fallback_dimension: usize) -> Self {
        Self {
            fallback_dimension,
            ..self
        }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir(self, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..self
        }
    }

    /// Apply `EMBED_MODEL`, `EMBED_DIM` and `EMBED_DEVICE` overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment-shaped).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("EMBED_MODEL").filter(|m| !m.trim().is_empty()) {
            self.model_name = model.trim().to_string();
        }
        if let Some(dim) = lookup("EMBED_DIM") {
            self.fallback_dimension = dim.trim().parse().map_err(|_| {
                EmbedError::invalid_config(format!("EMBED_DIM is not an integer: '{dim}'"))
            })?;
        }
        if let Some(device) = lookup("EMBED_DEVICE") {
            self.device = device.parse()?;
        }
        Ok(())
    }

    /// Validate values that would otherwise fail deep inside model loading
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model_name must not be empty"));
        }
        if self.fallback_dimension == 0 {
            return Err(EmbedError::invalid_config(
                "fallback_dimension must be greater than zero",
            ));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config(
                "batch_size must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            fallback_dimension: DEFAULT_FALLBACK_DIMENSION,
            device: Device::Cpu,
            cache_dir: PathBuf::from(".studyrag/models"),
            batch_size: 16,
            onnx_file: "onnx/model.onnx".to_string(),
            hf_revision: "main".to_string(),
        }
    }
}

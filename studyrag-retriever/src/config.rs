//! Retriever configuration: defaults, an optional TOML file and environment
//! overrides, applied in that order.
//!
//! ```toml
//! knowledge_dir = "data/knowledge"
//! vector_dir = "data/vector_store"
//! chunk_size = 1000
//! chunk_overlap = 200
//! recovery = "abort"
//!
//! [embedding]
//! model_name = "BAAI/bge-m3"
//! fallback_dimension = 1024
//! device = "cpu"
//! ```

use crate::error::{Result, RetrieverError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use studyrag_context::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use studyrag_embed::EmbedConfig;

/// File picked up from the working directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "studyrag.toml";

/// What to do when the persisted store exists but cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexRecovery {
    /// Surface the load failure to the caller
    #[default]
    Abort,
    /// Move the unreadable store aside and start a new empty index
    Recreate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Root that fragment `source` paths are relative to
    pub knowledge_dir: PathBuf,
    /// Directory holding the persisted index
    pub vector_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub recovery: IndexRecovery,
    pub embedding: EmbedConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            knowledge_dir: PathBuf::from("data/knowledge"),
            vector_dir: PathBuf::from("data/vector_store"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            recovery: IndexRecovery::Abort,
            embedding: EmbedConfig::default(),
        }
    }
}

impl RetrieverConfig {
    /// Configuration rooted at `base`: knowledge and vector directories live
    /// under `base/data`.
    pub fn with_base_dir(base: impl AsRef<Path>) -> Self {
        let data = base.as_ref().join("data");
        Self {
            knowledge_dir: data.join("knowledge"),
            vector_dir: data.join("vector_store"),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RetrieverError::invalid_config(format!("invalid TOML: {e}")))
    }

    /// Load configuration from the process environment.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// read if present in the working directory.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok()).await
    }

    /// [`load`](Self::load) with an explicit environment lookup.
    pub async fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::read_file(path).await?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if tokio::fs::try_exists(default_path).await.unwrap_or(false) {
                    Self::read_file(default_path).await?
                } else {
                    Self::default()
                }
            }
        };

        config
            .embedding
            .apply_overrides(lookup)
            .map_err(|e| RetrieverError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    async fn read_file(path: &Path) -> Result<Self> {
        tracing::debug!("Reading configuration from {}", path.display());
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RetrieverError::PathNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RetrieverError::invalid_config(
                "chunk_size must be greater than zero",
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RetrieverError::invalid_config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        self.embedding
            .validate()
            .map_err(|e| RetrieverError::invalid_config(e.to_string()))
    }
}

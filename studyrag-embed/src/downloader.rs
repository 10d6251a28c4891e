//! HuggingFace model downloading for models fastembed does not ship

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;

/// Local paths of the files needed to run a user-defined ONNX model.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub onnx: PathBuf,
    pub tokenizer: PathBuf,
    pub config: PathBuf,
    /// Absent when the repository does not publish one
    pub special_tokens_map: Option<PathBuf>,
    /// Absent when the repository does not publish one
    pub tokenizer_config: Option<PathBuf>,
}

/// Downloads models from HuggingFace Hub into the configured cache directory
pub struct ModelDownloader {
    api: Api,
}

impl ModelDownloader {
    /// Create a downloader that caches under `config.cache_dir`.
    pub fn new(config: &EmbedConfig) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_cache_dir(config.cache_dir.clone())
            .with_progress(false)
            .build()
            .map_err(EmbedError::model_init)?;
        Ok(Self { api })
    }

    /// Fetch (or reuse from cache) every file the model needs.
    ///
    /// `tokenizer.json`, `config.json` and the ONNX file are required; the
    /// special-tokens map and tokenizer config are optional and replaced by
    /// minimal generated content when the repository lacks them.
    pub async fn ensure_model(&self, config: &EmbedConfig) -> Result<ModelFiles> {
        let repo = self.api.repo(Repo::with_revision(
            config.model_name.clone(),
            RepoType::Model,
            config.hf_revision.clone(),
        ));

        tracing::info!(
            "Fetching model {} (revision {}) from HuggingFace",
            config.model_name,
            config.hf_revision
        );

        let files = ModelFiles {
            onnx: fetch_required(&repo, &config.onnx_file).await?,
            tokenizer: fetch_required(&repo, "tokenizer.json").await?,
            config: fetch_required(&repo, "config.json").await?,
            special_tokens_map: fetch_optional(&repo, "special_tokens_map.json").await,
            tokenizer_config: fetch_optional(&repo, "tokenizer_config.json").await,
        };

        tracing::debug!("Model files available: {:?}", files);
        Ok(files)
    }
}

async fn fetch_required(repo: &ApiRepo, remote_path: &str) -> Result<PathBuf> {
    let path = repo.get(remote_path).await.map_err(EmbedError::model_init)?;
    if !path.exists() {
        return Err(EmbedError::ModelFileNotFound { path });
    }
    Ok(path)
}

async fn fetch_optional(repo: &ApiRepo, remote_path: &str) -> Option<PathBuf> {
    match repo.get(remote_path).await {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!("Optional model file {} unavailable: {}", remote_path, e);
            None
        }
    }
}

/// Content used when a repository has no `special_tokens_map.json`.
pub(crate) fn fallback_special_tokens_map() -> serde_json::Value {
    serde_json::json!({
        "cls_token": "[CLS]",
        "mask_token": "[MASK]",
        "pad_token": "[PAD]",
        "sep_token": "[SEP]",
        "unk_token": "[UNK]"
    })
}

/// Content used when a repository has no `tokenizer_config.json`.
pub(crate) fn fallback_tokenizer_config() -> serde_json::Value {
    serde_json::json!({
        "clean_up_tokenization_spaces": true,
        "do_lower_case": false,
        "model_max_length": 512,
        "tokenizer_class": "BertTokenizer"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_files_are_objects() {
        assert!(fallback_special_tokens_map().is_object());
        assert_eq!(fallback_tokenizer_config()["model_max_length"], 512);
    }

    #[test]
    fn test_downloader_uses_cache_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = EmbedConfig::new("some-org/some-model").with_cache_dir(temp_dir.path());
        assert!(ModelDownloader::new(&config).is_ok());
    }
}

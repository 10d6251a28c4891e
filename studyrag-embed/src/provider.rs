//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::downloader::{ModelDownloader, fallback_special_tokens_map, fallback_tokenizer_config};
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::sync::OnceCell;

/// Tolerance used when checking that a vector has unit length.
pub const UNIT_LENGTH_TOLERANCE: f32 = 1e-3;

/// Trait for embedding providers that turn text into fixed-length vectors.
///
/// Every vector returned by an implementation is L2-normalized and has the
/// same length for the lifetime of the provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed document fragments, one vector per input text, in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the underlying model
    fn model_name(&self) -> &str;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Whether `vector` has unit L2 norm within [`UNIT_LENGTH_TOLERANCE`].
pub fn is_unit_length(vector: &[f32]) -> bool {
    if vector.is_empty() {
        return false;
    }
    let norm = vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt();
    (norm - 1.0).abs() <= f64::from(UNIT_LENGTH_TOLERANCE)
}

/// Look up a fastembed built-in model by its model code (e.g. `BAAI/bge-m3`).
///
/// fastembed often ships a model under a mirror organisation
/// (`Xenova/bge-small-en-v1.5`), so a code that does not match exactly is
/// matched again on its repository name alone.
pub fn builtin_model(model_name: &str) -> Option<EmbeddingModel> {
    let models = TextEmbedding::list_supported_models();
    let repo_name = |code: &str| code.rsplit('/').next().unwrap_or(code).to_ascii_lowercase();

    models
        .iter()
        .find(|info| info.model_code.eq_ignore_ascii_case(model_name))
        .or_else(|| {
            let wanted = repo_name(model_name);
            models.iter().find(|info| repo_name(&info.model_code) == wanted)
        })
        .map(|info| info.model.clone())
}

type SharedModel = Arc<Mutex<TextEmbedding>>;

/// FastEmbed-based provider running ONNX models on the CPU.
///
/// The model is loaded on the first embedding call and reused for every
/// call after that. Inference holds a mutex around the model, so concurrent
/// callers are served one at a time.
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: OnceCell<SharedModel>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("loaded", &self.model.initialized())
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a provider whose model loads lazily on first use.
    pub fn new(config: EmbedConfig) -> Self {
        Self {
            config,
            model: OnceCell::new(),
        }
    }

    /// Creates a provider and loads its model immediately.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let provider = Self::new(config);
        provider.model().await?;
        Ok(provider)
    }

    /// The configuration this provider was built with
    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Whether the model has been loaded yet
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<SharedModel> {
        self.model
            .get_or_try_init(|| self.load_model())
            .await
            .map(Arc::clone)
    }

    async fn load_model(&self) -> Result<SharedModel> {
        self.config.validate()?;
        tracing::info!(
            "Loading embedding model {} on {}",
            self.config.model_name,
            self.config.device
        );

        let model = match builtin_model(&self.config.model_name) {
            Some(builtin) => {
                let options = InitOptions::new(builtin)
                    .with_cache_dir(self.config.cache_dir.clone())
                    .with_show_download_progress(false);
                tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
                    .await?
                    .map_err(|e| EmbedError::External { source: e })?
            }
            None => self.load_user_defined_model().await?,
        };

        tracing::info!("Embedding model {} loaded", self.config.model_name);
        Ok(Arc::new(Mutex::new(model)))
    }

    /// Load an ONNX model from a HuggingFace repository
    async fn load_user_defined_model(&self) -> Result<TextEmbedding> {
        tracing::info!(
            "{} is not a fastembed built-in, loading it as a user-defined model",
            self.config.model_name
        );

        let files = ModelDownloader::new(&self.config)?
            .ensure_model(&self.config)
            .await?;

        let tokenizer_files = TokenizerFiles {
            tokenizer_file: fs::read(&files.tokenizer).await?,
            config_file: fs::read(&files.config).await?,
            special_tokens_map_file: read_or_fallback(
                files.special_tokens_map.as_deref(),
                fallback_special_tokens_map,
            )
            .await?,
            tokenizer_config_file: read_or_fallback(
                files.tokenizer_config.as_deref(),
                fallback_tokenizer_config,
            )
            .await?,
        };
        let user_model = UserDefinedEmbeddingModel::new(fs::read(&files.onnx).await?, tokenizer_files);

        tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new_from_user_defined(user_model, Default::default())
        })
        .await?
        .map_err(|e| EmbedError::External { source: e })
    }

    /// Run one inference call while holding the model lock.
    async fn embed_batch(&self, model: SharedModel, batch: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = batch.len();
        let mut embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = model.lock().map_err(|_| EmbedError::LockPoisoned)?;
            guard
                .embed(batch, None)
                .map_err(|e| EmbedError::External { source: e })
        })
        .await??;

        if embeddings.len() != expected {
            return Err(EmbedError::CountMismatch {
                expected,
                actual: embeddings.len(),
            });
        }
        for embedding in &mut embeddings {
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(EmbedError::InvalidOutput {
                    message: "non-finite values in embedding".to_string(),
                });
            }
            l2_normalize(embedding);
        }
        Ok(embeddings)
    }
}

async fn read_or_fallback(path: Option<&Path>, fallback: fn() -> serde_json::Value) -> Result<Vec<u8>> {
    match path {
        Some(path) => Ok(fs::read(path).await?),
        None => serde_json::to_vec_pretty(&fallback())
            .map_err(|e| EmbedError::External { source: e.into() }),
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbedError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model().await?;
        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let batch = self.embed_batch(Arc::clone(&model), chunk.to_vec()).await?;
            all_embeddings.extend(batch);
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

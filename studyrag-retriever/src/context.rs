//! Process-lifetime state shared by ingestion and querying.
//!
//! A [`RetrieverContext`] is built once by the binary (or once per test) and
//! borrowed by [`IngestionPipeline`](crate::retrieval::IngestionPipeline) and
//! [`QueryEngine`](crate::retrieval::QueryEngine). It owns the embedding
//! provider and the single vector index, which is created or loaded lazily on
//! first access.
//!
//! The index follows a single-writer, many-reader discipline: searches share
//! a read lock, and a write holds the write lock across both the in-memory
//! insert and the save that follows it.

use crate::config::{IndexRecovery, RetrieverConfig};
use crate::error::{Result, RetrieverError};
use crate::index::{EntryId, FlatL2Index, Fragment, VectorIndex};
use crate::storage::PersistenceManager;
use std::sync::Arc;
use studyrag_context::RecursiveSplitter;
use studyrag_embed::{EmbeddingProvider, FastEmbedProvider, HashingEmbedder};
use tokio::sync::{OnceCell, RwLock, RwLockReadGuard};
use tracing::{info, warn};

/// Text embedded to discover the model's output dimension.
const DIMENSION_PROBE: &str = "dimension probe";

type SharedIndex = RwLock<Box<dyn VectorIndex>>;

pub struct RetrieverContext {
    config: RetrieverConfig,
    provider: Arc<dyn EmbeddingProvider>,
    persistence: PersistenceManager,
    splitter: RecursiveSplitter,
    index: OnceCell<SharedIndex>,
}

impl std::fmt::Debug for RetrieverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieverContext")
            .field("config", &self.config)
            .field("provider", &self.provider.provider_name())
            .field("index_loaded", &self.index.initialized())
            .finish()
    }
}

impl RetrieverContext {
    /// Build a context around an explicit embedding provider.
    pub fn new(config: RetrieverConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        let splitter = RecursiveSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let persistence = PersistenceManager::new(&config.vector_dir);
        Ok(Self {
            config,
            provider,
            persistence,
            splitter,
            index: OnceCell::new(),
        })
    }

    /// Build a context using the configured FastEmbed model. The model itself
    /// is loaded on first use.
    pub fn with_fastembed(config: RetrieverConfig) -> Result<Self> {
        let provider = Arc::new(FastEmbedProvider::new(config.embedding.clone()));
        Self::new(config, provider)
    }

    /// Build a context that embeds with feature hashing at the fallback
    /// dimension, needing no model files.
    pub fn offline(config: RetrieverConfig) -> Result<Self> {
        let provider = Arc::new(HashingEmbedder::new(config.embedding.fallback_dimension)?);
        Self::new(config, provider)
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn splitter(&self) -> &RecursiveSplitter {
        &self.splitter
    }

    pub fn persistence(&self) -> &PersistenceManager {
        &self.persistence
    }

    /// Whether the index has been loaded or created yet
    pub fn is_index_ready(&self) -> bool {
        self.index.initialized()
    }

    /// Shared read access to the index, initializing it if needed.
    pub async fn read_index(&self) -> Result<RwLockReadGuard<'_, Box<dyn VectorIndex>>> {
        Ok(self.index().await?.read().await)
    }

    /// Append a batch and persist it while holding the write lock.
    ///
    /// If the save fails the batch is removed again, so memory never holds
    /// entries the store does not.
    pub async fn add_and_persist(&self, entries: Vec<(Vec<f32>, Fragment)>) -> Result<Vec<EntryId>> {
        let mut index = self.index().await?.write().await;
        let before = index.count();
        let ids = index.add(entries)?;

        if let Err(e) = self
            .persistence
            .save(&**index, self.provider.model_name())
            .await
        {
            warn!("Saving index failed, rolling back {} entries: {}", ids.len(), e);
            index.truncate(before);
            return Err(e);
        }

        info!("Added {} entries, index now holds {}", ids.len(), index.count());
        Ok(ids)
    }

    /// Make sure the index exists in memory and on disk.
    pub async fn initialize(&self) -> Result<()> {
        let index = self.index().await?.read().await;
        self.persistence
            .save(&**index, self.provider.model_name())
            .await?;
        Ok(())
    }

    async fn index(&self) -> Result<&SharedIndex> {
        self.index
            .get_or_try_init(|| async { self.open_index().await.map(RwLock::new) })
            .await
    }

    async fn open_index(&self) -> Result<Box<dyn VectorIndex>> {
        match self.persistence.load().await {
            Ok(Some(loaded)) => {
                if loaded.manifest.embedding_model != self.provider.model_name() {
                    warn!(
                        "Index at {} was built with '{}' but the configured model is '{}'; distances may be meaningless",
                        self.persistence.directory().display(),
                        loaded.manifest.embedding_model,
                        self.provider.model_name()
                    );
                }
                Ok(loaded.index)
            }
            Ok(None) => self.create_index().await,
            Err(e @ RetrieverError::IndexLoadFailure { .. }) => match self.config.recovery {
                IndexRecovery::Abort => Err(e),
                IndexRecovery::Recreate => {
                    warn!("{}; recreating an empty index", e);
                    self.persistence.quarantine().await?;
                    self.create_index().await
                }
            },
            Err(e) => Err(e),
        }
    }

    async fn create_index(&self) -> Result<Box<dyn VectorIndex>> {
        let dimension = match self.provider.embed_query(DIMENSION_PROBE).await {
            Ok(vector) if !vector.is_empty() => vector.len(),
            Ok(_) => {
                warn!(
                    "Embedding probe returned an empty vector, using configured dimension {}",
                    self.config.embedding.fallback_dimension
                );
                self.config.embedding.fallback_dimension
            }
            Err(e) => {
                warn!(
                    "Embedding probe failed ({}), using configured dimension {}",
                    e, self.config.embedding.fallback_dimension
                );
                self.config.embedding.fallback_dimension
            }
        };

        info!("Creating new flat L2 index with dimension {}", dimension);
        Ok(Box::new(FlatL2Index::new(dimension)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use studyrag_embed::EmbedError;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    /// Provider whose model never loads.
    struct BrokenProvider;

    #[async_trait]
    impl EmbeddingProvider for BrokenProvider {
        async fn embed_query(&self, _text: &str) -> studyrag_embed::Result<Vec<f32>> {
            Err(EmbedError::invalid_config("model unavailable"))
        }

        async fn embed_documents(&self, _texts: &[String]) -> studyrag_embed::Result<Vec<Vec<f32>>> {
            Err(EmbedError::invalid_config("model unavailable"))
        }

        fn model_name(&self) -> &str {
            "broken"
        }

        fn provider_name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_index_created_lazily_with_probed_dimension() {
        let temp_dir = tempdir().unwrap();
        let mut config = RetrieverConfig::with_base_dir(temp_dir.path());
        config.embedding.fallback_dimension = 16;
        let context = RetrieverContext::offline(config).unwrap();

        assert!(!context.is_index_ready());
        let index = context.read_index().await.unwrap();
        assert_eq!(index.dimension(), 16);
        assert_eq!(index.count(), 0);
        drop(index);
        assert!(context.is_index_ready());
        // Nothing is written until something is added
        assert!(!context.config().vector_dir.exists());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_probe_failure_falls_back_to_configured_dimension() {
        let temp_dir = tempdir().unwrap();
        let mut config = RetrieverConfig::with_base_dir(temp_dir.path());
        config.embedding.fallback_dimension = 24;
        let context = RetrieverContext::new(config, Arc::new(BrokenProvider)).unwrap();

        let index = context.read_index().await.unwrap();
        assert_eq!(index.dimension(), 24);
        assert!(logs_contain("Embedding probe failed"));
    }

    #[tokio::test]
    async fn test_initialize_writes_empty_store() {
        let temp_dir = tempdir().unwrap();
        let mut config = RetrieverConfig::with_base_dir(temp_dir.path());
        config.embedding.fallback_dimension = 8;
        let context = RetrieverContext::offline(config.clone()).unwrap();
        context.initialize().await.unwrap();

        let loaded = PersistenceManager::new(&config.vector_dir)
            .load()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.index.count(), 0);
        assert_eq!(loaded.index.dimension(), 8);
        assert_eq!(loaded.manifest.embedding_model, "feature-hashing");
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let temp_dir = tempdir().unwrap();
        let mut config = RetrieverConfig::with_base_dir(temp_dir.path());
        config.embedding.fallback_dimension = 2;
        let context = RetrieverContext::offline(config.clone()).unwrap();
        assert_eq!(context.read_index().await.unwrap().count(), 0);

        // A regular file where the store directory should be
        tokio::fs::create_dir_all(temp_dir.path().join("data")).await.unwrap();
        tokio::fs::write(&config.vector_dir, b"not a directory").await.unwrap();

        let fragment = Fragment {
            text: "lost".to_string(),
            source: "a.txt".to_string(),
            chunk_id: 0,
        };
        assert!(
            context
                .add_and_persist(vec![(vec![1.0, 0.0], fragment)])
                .await
                .is_err()
        );
        assert_eq!(context.read_index().await.unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_store_path_that_is_a_file_fails_to_load() {
        let temp_dir = tempdir().unwrap();
        let config = RetrieverConfig::with_base_dir(temp_dir.path());
        tokio::fs::create_dir_all(temp_dir.path().join("data")).await.unwrap();
        tokio::fs::write(&config.vector_dir, b"not a directory").await.unwrap();

        let context = RetrieverContext::offline(config).unwrap();
        assert_eq!(
            context.read_index().await.unwrap_err().kind(),
            "index_load_failure"
        );
    }

    #[tokio::test]
    async fn test_corrupt_store_recreate_preserves_old_data() {
        let temp_dir = tempdir().unwrap();
        let mut config = RetrieverConfig::with_base_dir(temp_dir.path());
        config.embedding.fallback_dimension = 4;
        config.recovery = IndexRecovery::Recreate;
        tokio::fs::create_dir_all(&config.vector_dir).await.unwrap();
        tokio::fs::write(config.vector_dir.join("manifest.json"), b"{oops")
            .await
            .unwrap();

        let context = RetrieverContext::offline(config.clone()).unwrap();
        assert_eq!(context.read_index().await.unwrap().count(), 0);

        let mut moved = Vec::new();
        let mut entries = tokio::fs::read_dir(temp_dir.path().join("data")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("vector_store.corrupt-") {
                moved.push(entry.path());
            }
        }
        assert_eq!(moved.len(), 1);
        assert!(moved[0].join("manifest.json").exists());
    }
}

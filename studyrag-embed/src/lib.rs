//! # studyrag-embed
//!
//! Text embeddings for the studyrag retrieval pipeline. Runs ONNX models
//! locally on the CPU through FastEmbed and hands back L2-normalized `f32`
//! vectors, so Euclidean distance between them ranks like cosine similarity.
//!
//! ## Quick Start
//!
//! ```no_run
//! use studyrag_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::new(EmbedConfig::new("BAAI/bge-small-en-v1.5"));
//!
//! // The model is loaded here, on first use
//! let query = provider.embed_query("what is a flat index?").await?;
//! let docs = provider
//!     .embed_documents(&["Flat indexes scan every vector.".to_string()])
//!     .await?;
//!
//! assert_eq!(query.len(), docs[0].len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: fastembed built-in models, or any HuggingFace
//!   repository that publishes an ONNX export (fetched with `hf-hub`)
//! - [`HashingEmbedder`]: deterministic feature hashing with no model files,
//!   for offline runs and tests
//!
//! Both implement [`EmbeddingProvider`], which is what the rest of the
//! workspace depends on.

pub mod config;
pub mod downloader;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::{DEFAULT_FALLBACK_DIMENSION, DEFAULT_MODEL_NAME, Device, EmbedConfig};
pub use downloader::{ModelDownloader, ModelFiles};
pub use error::{EmbedError, Result};
pub use hashing::HashingEmbedder;
pub use provider::{
    EmbeddingProvider, FastEmbedProvider, UNIT_LENGTH_TOLERANCE, is_unit_length, l2_normalize,
};

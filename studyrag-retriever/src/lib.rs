//! studyrag-retriever: document ingestion and nearest-neighbour retrieval
//!
//! This crate turns a directory of notes (plain text, markdown and PDF) into a
//! persisted flat L2 vector index and answers questions by returning the
//! closest fragments.
//!
//! ## Key Modules
//!
//! - **[`loader`]**: Reads supported documents into plain text
//! - **[`index`]**: The [`VectorIndex`](index::VectorIndex) trait and the flat L2 index
//! - **[`storage`]**: Saving and loading the index directory
//! - **[`context`]**: Shared provider, splitter and lazily opened index
//! - **[`retrieval`]**: Ingestion pipeline and query engine
//! - **[`status`]**: Live index status
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studyrag_retriever::{
//!     config::RetrieverConfig,
//!     context::RetrieverContext,
//!     retrieval::{IngestionPipeline, QueryEngine},
//! };
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetrieverConfig::load(None).await?;
//! let context = RetrieverContext::with_fastembed(config)?;
//!
//! IngestionPipeline::new(&context)
//!     .ingest_path(Path::new("lectures"))
//!     .await?;
//! let response = QueryEngine::new(&context).query("What is a monad?", 5).await?;
//! println!("{}", response.answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files → Loader → Splitter → EmbeddingProvider → VectorIndex → PersistenceManager
//!                                     ↑                ↓
//!                        Question → QueryEngine ← search
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod loader;
pub mod retrieval;
pub mod status;
pub mod storage;

pub use error::{Result, RetrieverError};

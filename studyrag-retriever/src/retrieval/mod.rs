//! Ingestion and query over a [`RetrieverContext`](crate::context::RetrieverContext).

pub mod ingest;
pub mod query;

pub use ingest::{DirectoryIngestReport, FileIngestError, IngestOutcome, IngestionPipeline};
pub use query::{
    DEFAULT_TOP_K, EMPTY_INDEX_ANSWER, QueryEngine, QueryResponse, RetrievedFragment,
};

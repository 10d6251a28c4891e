//! Index status reporting.

use crate::context::RetrieverContext;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Snapshot of the live index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Index structure, e.g. `IndexFlatL2`
    pub index_type: String,
    pub embedding_dimension: usize,
    /// Number of indexed fragments
    pub doc_count: usize,
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Index type: {}", self.index_type)?;
        writeln!(f, "Embedding dimension: {}", self.embedding_dimension)?;
        write!(f, "Indexed fragments: {}", self.doc_count)
    }
}

/// Read the status from the context's index, loading or creating it if this
/// is the first access.
pub async fn index_status(context: &RetrieverContext) -> Result<IndexStatus> {
    let index = context.read_index().await?;
    Ok(IndexStatus {
        index_type: index.index_type().to_string(),
        embedding_dimension: index.dimension(),
        doc_count: index.count(),
    })
}

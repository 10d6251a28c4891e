//! Query engine: embed a question and return the closest fragments.

use crate::context::RetrieverContext;
use crate::error::Result;
use serde::Serialize;
use tracing::{debug, info};

/// Answer returned when nothing has been ingested yet.
pub const EMPTY_INDEX_ANSWER: &str = "No documents in the index yet. Ingest something first.";

const ANSWER_HEADER: &str = "Top matching chunks from your library:\n\n";
const ANSWER_TRAILER: &str =
    "\n\n(Next step: call an LLM service to turn this into a narrative answer.)";

/// Default number of fragments to retrieve.
pub const DEFAULT_TOP_K: usize = 5;

/// A fragment returned by a query, in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedFragment {
    pub source: String,
    pub chunk_id: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub retrieved: Vec<RetrievedFragment>,
}

impl QueryResponse {
    fn empty() -> Self {
        Self {
            answer: EMPTY_INDEX_ANSWER.to_string(),
            retrieved: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    context: &'a RetrieverContext,
}

impl<'a> QueryEngine<'a> {
    pub fn new(context: &'a RetrieverContext) -> Self {
        Self { context }
    }

    /// Retrieve the `k` fragments nearest to `question`.
    ///
    /// An empty index yields [`EMPTY_INDEX_ANSWER`] without embedding the
    /// question.
    pub async fn query(&self, question: &str, k: usize) -> Result<QueryResponse> {
        let question = question.trim();

        if self.context.read_index().await?.count() == 0 {
            debug!("Query against an empty index");
            return Ok(QueryResponse::empty());
        }

        // No index lock is held while embedding
        let vector = self.context.provider().embed_query(question).await?;

        let index = self.context.read_index().await?;
        let hits = index.search(&vector, k)?;
        let retrieved: Vec<RetrievedFragment> = hits
            .iter()
            .filter_map(|hit| index.fragment(hit.id))
            .map(|fragment| RetrievedFragment {
                source: fragment.source.clone(),
                chunk_id: fragment.chunk_id,
                text: fragment.text.trim().to_string(),
            })
            .collect();
        drop(index);

        if retrieved.is_empty() {
            return Ok(QueryResponse::empty());
        }

        info!("Query matched {} fragments", retrieved.len());
        Ok(QueryResponse {
            answer: format_answer(&retrieved),
            retrieved,
        })
    }
}

fn format_answer(retrieved: &[RetrievedFragment]) -> String {
    let body = retrieved
        .iter()
        .enumerate()
        .map(|(i, fragment)| format!("[{}] {}", i + 1, fragment.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{ANSWER_HEADER}{body}{ANSWER_TRAILER}")
}

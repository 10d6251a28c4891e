//! Nearest-neighbor index over embedded document fragments.
//!
//! The ingestion pipeline and query engine only see the [`VectorIndex`]
//! trait; [`FlatL2Index`] is the one implementation today.
//!
//! ## Invariants
//!
//! - Every stored vector has exactly [`VectorIndex::dimension`] components.
//! - Entry ids are assigned sequentially from the current count and the id of
//!   an entry is its position; ids are never reused once persisted.
//! - `add` is all-or-nothing: a batch containing any bad vector inserts
//!   nothing.

use crate::error::Result;
use serde::{Deserialize, Serialize};

pub mod flat;

pub use flat::FlatL2Index;

/// Position of an entry in the index.
pub type EntryId = usize;

/// A chunk of source text with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    /// Path of the source file relative to the knowledge root
    pub source: String,
    /// Position of this fragment in its source's split output
    pub chunk_id: usize,
}

/// One search result, ordered by ascending `distance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub id: EntryId,
    pub distance: f32,
}

/// Borrowed view of an index's contents, used for persistence.
#[derive(Debug, Clone, Copy)]
pub struct IndexSnapshot<'a> {
    pub index_type: &'static str,
    pub dimension: usize,
    /// Row-major, `fragments.len() * dimension` values
    pub vectors: &'a [f32],
    pub fragments: &'a [Fragment],
}

/// Capability set of a nearest-neighbor structure.
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Short identifier of the structure, recorded in the persisted manifest
    fn index_type(&self) -> &'static str;

    fn dimension(&self) -> usize;

    /// Number of stored entries
    fn count(&self) -> usize;

    /// Insert a batch of (vector, fragment) pairs, returning their ids in
    /// input order. Fails without inserting anything if any vector is invalid.
    fn add(&mut self, entries: Vec<(Vec<f32>, Fragment)>) -> Result<Vec<EntryId>>;

    /// The `min(k, count)` nearest entries to `query`, closest first. An
    /// empty index returns no hits without checking the query's length.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    fn fragment(&self, id: EntryId) -> Option<&Fragment>;

    /// Drop every entry with an id of `count` or above. Only used to roll back
    /// a batch whose persistence failed.
    fn truncate(&mut self, count: usize);

    fn snapshot(&self) -> IndexSnapshot<'_>;
}

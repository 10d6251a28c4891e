//! Persistence of the vector index to a directory.
//!
//! ## Layout
//!
//! ```text
//! <vector_dir>/
//!   index.bin       vector buffer, see [`index_file`]
//!   fragments.json  [{id, text, source, chunk_id}, ...] in id order
//!   manifest.json   format version, index type, dimension, doc_count,
//!                   embedding model and save time
//! ```
//!
//! Each file is written to a hidden temporary sibling and renamed into place.
//! The manifest goes last and is the commit record: its `doc_count` is the
//! number of entries a reader trusts. Because the data files only ever grow,
//! entries beyond `doc_count` (left by a save interrupted before its manifest
//! was renamed) are discarded on load.
//!
//! Loading never silently drops a committed store. An absent or never-written
//! directory is `Ok(None)`, as is one whose manifest was never written; anything
//! else that cannot be read is
//! [`RetrieverError::IndexLoadFailure`] and the caller decides what to do.

use crate::error::{Result, RetrieverError};
use crate::index::{EntryId, FlatL2Index, Fragment, VectorIndex, flat::FLAT_L2_INDEX_TYPE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub mod index_file;

pub const INDEX_FILE: &str = "index.bin";
pub const FRAGMENTS_FILE: &str = "fragments.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Version of the directory layout recorded in the manifest.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Commit record of a persisted store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub index_type: String,
    pub dimension: usize,
    pub doc_count: usize,
    pub embedding_model: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredFragment {
    id: EntryId,
    #[serde(flatten)]
    fragment: Fragment,
}

/// An index read back from disk together with its manifest.
#[derive(Debug)]
pub struct LoadedIndex {
    pub index: Box<dyn VectorIndex>,
    pub manifest: Manifest,
}

/// Saves and loads the index for one directory.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    directory: PathBuf,
}

impl PersistenceManager {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write `index` to the directory, creating it if absent.
    pub async fn save(&self, index: &dyn VectorIndex, embedding_model: &str) -> Result<Manifest> {
        // Encode everything before the first await so no borrow of the
        // index is held across IO.
        let (index_bytes, fragments_bytes, manifest) = {
            let snapshot = index.snapshot();
            let index_bytes = index_file::encode(snapshot.dimension, snapshot.vectors)
                .map_err(RetrieverError::invalid_config)?;
            let stored: Vec<StoredFragment> = snapshot
                .fragments
                .iter()
                .enumerate()
                .map(|(id, fragment)| StoredFragment {
                    id,
                    fragment: fragment.clone(),
                })
                .collect();
            let manifest = Manifest {
                format_version: STORE_FORMAT_VERSION,
                index_type: snapshot.index_type.to_string(),
                dimension: snapshot.dimension,
                doc_count: snapshot.fragments.len(),
                embedding_model: embedding_model.to_string(),
                saved_at: Utc::now(),
            };
            (index_bytes, serde_json::to_vec(&stored)?, manifest)
        };

        fs::create_dir_all(&self.directory).await?;
        self.write_atomic(INDEX_FILE, &index_bytes).await?;
        self.write_atomic(FRAGMENTS_FILE, &fragments_bytes).await?;
        self.write_atomic(MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)
            .await?;

        debug!(
            "Saved {} entries (dimension {}) to {}",
            manifest.doc_count,
            manifest.dimension,
            self.directory.display()
        );
        Ok(manifest)
    }

    async fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let target = self.directory.join(name);
        let temp = self.directory.join(format!(".{name}.tmp"));

        let mut file = fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, &target).await?;
        Ok(())
    }

    /// Read the store back.
    ///
    /// Returns `Ok(None)` when the directory does not exist, holds none of
    /// the store files, or has data files but no manifest.
    pub async fn load(&self) -> Result<Option<LoadedIndex>> {
        let metadata = match fs::metadata(&self.directory).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No index at {}", self.directory.display());
                return Ok(None);
            }
            Err(e) => return Err(self.failure(format!("cannot access directory: {e}"))),
        };
        if !metadata.is_dir() {
            return Err(self.failure("path exists but is not a directory"));
        }

        let mut present = Vec::new();
        let mut missing = Vec::new();
        for name in [INDEX_FILE, FRAGMENTS_FILE, MANIFEST_FILE] {
            if fs::try_exists(self.directory.join(name)).await.unwrap_or(false) {
                present.push(name);
            } else {
                missing.push(name);
            }
        }
        if present.is_empty() {
            debug!("Index directory {} is empty", self.directory.display());
            return Ok(None);
        }
        if missing.contains(&MANIFEST_FILE) {
            // Data files without a manifest come from a first save that never committed
            warn!(
                "No {} in {}, treating {} as uncommitted",
                MANIFEST_FILE,
                self.directory.display(),
                present.join(", ")
            );
            return Ok(None);
        }
        if !missing.is_empty() {
            return Err(self.failure(format!("incomplete store, missing {}", missing.join(", "))));
        }

        let manifest: Manifest = serde_json::from_slice(&self.read(MANIFEST_FILE).await?)
            .map_err(|e| self.failure(format!("unreadable {MANIFEST_FILE}: {e}")))?;
        if manifest.format_version != STORE_FORMAT_VERSION {
            return Err(self.failure(format!(
                "unsupported store format version {}",
                manifest.format_version
            )));
        }
        if manifest.index_type != FLAT_L2_INDEX_TYPE {
            return Err(self.failure(format!("unknown index type '{}'", manifest.index_type)));
        }

        let decoded = index_file::decode(&self.read(INDEX_FILE).await?)
            .map_err(|e| self.failure(format!("unreadable {INDEX_FILE}: {e}")))?;
        if decoded.dimension != manifest.dimension {
            return Err(self.failure(format!(
                "{INDEX_FILE} has dimension {} but manifest records {}",
                decoded.dimension, manifest.dimension
            )));
        }

        let stored: Vec<StoredFragment> = serde_json::from_slice(&self.read(FRAGMENTS_FILE).await?)
            .map_err(|e| self.failure(format!("unreadable {FRAGMENTS_FILE}: {e}")))?;

        let committed = manifest.doc_count;
        if decoded.count < committed || stored.len() < committed {
            return Err(self.failure(format!(
                "manifest records {} entries but {INDEX_FILE} holds {} and {FRAGMENTS_FILE} holds {}",
                committed,
                decoded.count,
                stored.len()
            )));
        }
        if decoded.count > committed || stored.len() > committed {
            warn!(
                "Discarding uncommitted entries in {} (manifest records {}, found {} vectors and {} fragments)",
                self.directory.display(),
                committed,
                decoded.count,
                stored.len()
            );
        }

        let mut fragments = Vec::with_capacity(committed);
        for (position, entry) in stored.into_iter().take(committed).enumerate() {
            if entry.id != position {
                return Err(self.failure(format!(
                    "fragment ids out of order: found {} at position {}",
                    entry.id, position
                )));
            }
            fragments.push(entry.fragment);
        }
        let mut vectors = decoded.vectors;
        vectors.truncate(committed * decoded.dimension);

        let index = FlatL2Index::from_parts(manifest.dimension, vectors, fragments)
            .map_err(|e| self.failure(e.to_string()))?;

        info!(
            "Loaded index from {} ({} entries, dimension {})",
            self.directory.display(),
            manifest.doc_count,
            manifest.dimension
        );
        Ok(Some(LoadedIndex {
            index: Box::new(index),
            manifest,
        }))
    }

    /// Move an unreadable store out of the way, preserving its contents.
    /// Returns the new location.
    pub async fn quarantine(&self) -> Result<PathBuf> {
        let name = self
            .directory
            .file_name()
            .ok_or_else(|| self.failure("cannot move a store without a directory name"))?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = self
            .directory
            .with_file_name(format!("{}.corrupt-{}", name.to_string_lossy(), stamp));

        fs::rename(&self.directory, &target).await?;
        warn!(
            "Moved unreadable index {} to {}",
            self.directory.display(),
            target.display()
        );
        Ok(target)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.directory.join(name))
            .await
            .map_err(|e| self.failure(format!("cannot read {name}: {e}")))
    }

    fn failure(&self, reason: impl Into<String>) -> RetrieverError {
        RetrieverError::load_failure(&self.directory, reason)
    }
}

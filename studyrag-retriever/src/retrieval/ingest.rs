//! Ingestion pipeline: load, split, embed, index, persist.
//!
//! ```text
//! file → loader → splitter → embedding provider → index.add → save
//! ```
//!
//! A single file either lands completely or not at all: its fragments are
//! embedded first and then added and saved as one batch. Directory ingestion
//! isolates failures per file and keeps going, returning the failures
//! alongside the count.
//!
//! Re-ingesting a file adds its fragments again under new ids; there is no
//! deduplication.

use crate::context::RetrieverContext;
use crate::error::{Result, RetrieverError};
use crate::index::Fragment;
use crate::loader::{self, DocumentKind};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Result of ingesting a path that may be a file or a directory.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub chunks_added: usize,
    pub detail: String,
    /// Per-file failures; always empty for a single file
    pub errors: Vec<FileIngestError>,
}

/// A file that failed during directory ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileIngestError {
    pub path: PathBuf,
    /// Stable error kind, see [`RetrieverError::kind`]
    pub kind: String,
    pub message: String,
}

impl FileIngestError {
    fn new(path: PathBuf, error: &RetrieverError) -> Self {
        Self {
            path,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Totals for one directory walk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectoryIngestReport {
    pub chunks_added: usize,
    pub files_ingested: usize,
    pub errors: Vec<FileIngestError>,
}

/// Feeds documents into the context's index.
#[derive(Debug, Clone, Copy)]
pub struct IngestionPipeline<'a> {
    context: &'a RetrieverContext,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(context: &'a RetrieverContext) -> Self {
        Self { context }
    }

    /// Ingest a file or directory. Relative paths are taken relative to the
    /// knowledge root.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestOutcome> {
        let target = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.context.config().knowledge_dir.join(path)
        };

        let metadata = match fs::metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RetrieverError::PathNotFound { path: target });
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_file() {
            let chunks_added = self.ingest_file(&target).await?;
            Ok(IngestOutcome {
                chunks_added,
                detail: format!("Ingested file {}", target.display()),
                errors: Vec::new(),
            })
        } else {
            let report = self.ingest_directory(&target).await?;
            Ok(IngestOutcome {
                chunks_added: report.chunks_added,
                detail: format!("Ingested directory {}", target.display()),
                errors: report.errors,
            })
        }
    }

    /// Ingest one file, returning the number of fragments added.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        DocumentKind::from_path(path)?;
        let text = loader::load_document(path).await?;
        let source = self.source_for(path).await;

        let fragments: Vec<Fragment> = self
            .context
            .splitter()
            .split_text(&text)
            .into_iter()
            .enumerate()
            .map(|(chunk_id, text)| Fragment {
                text,
                source: source.clone(),
                chunk_id,
            })
            .collect();

        if fragments.is_empty() {
            info!("No text to index in {}", path.display());
            return Ok(0);
        }
        debug!("Split {} into {} fragments", path.display(), fragments.len());

        let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
        let vectors = self.context.provider().embed_documents(&texts).await?;
        if vectors.len() != fragments.len() {
            return Err(studyrag_embed::EmbedError::CountMismatch {
                expected: fragments.len(),
                actual: vectors.len(),
            }
            .into());
        }
        debug_assert!(vectors.iter().all(|v| studyrag_embed::is_unit_length(v)));

        let count = fragments.len();
        self.context
            .add_and_persist(vectors.into_iter().zip(fragments).collect())
            .await?;

        info!("Ingested {} ({} fragments)", path.display(), count);
        Ok(count)
    }

    /// Ingest every supported file under `root`, in sorted path order.
    ///
    /// Unsupported files and anything that is not a regular file are skipped.
    /// A failing file is recorded in the report and the walk continues.
    pub async fn ingest_directory(&self, root: &Path) -> Result<DirectoryIngestReport> {
        let mut report = DirectoryIngestReport::default();
        let files = self.collect_files(root, &mut report.errors).await?;
        info!(
            "Ingesting {} supported files under {}",
            files.len(),
            root.display()
        );

        for file in files {
            match self.ingest_file(&file).await {
                Ok(count) => {
                    report.chunks_added += count;
                    report.files_ingested += 1;
                }
                Err(e) => {
                    error!("Failed to ingest {}: {}", file.display(), e);
                    report.errors.push(FileIngestError::new(file, &e));
                }
            }
        }

        if !report.errors.is_empty() {
            warn!(
                "{} files under {} failed to ingest",
                report.errors.len(),
                root.display()
            );
        }
        Ok(report)
    }

    /// Copy a document into the knowledge root under `file_name` and ingest
    /// it. Only the final component of `file_name` is used.
    pub async fn ingest_upload(&self, file_name: &str, content: &[u8]) -> Result<IngestOutcome> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| RetrieverError::invalid_config(format!("invalid file name '{file_name}'")))?;
        DocumentKind::from_path(Path::new(name))?;

        let knowledge_dir = &self.context.config().knowledge_dir;
        fs::create_dir_all(knowledge_dir).await?;
        let destination = knowledge_dir.join(name);
        fs::write(&destination, content).await?;

        let chunks_added = self.ingest_file(&destination).await?;
        Ok(IngestOutcome {
            chunks_added,
            detail: format!("Uploaded and ingested {}", destination.display()),
            errors: Vec::new(),
        })
    }

    async fn collect_files(
        &self,
        root: &Path,
        errors: &mut Vec<FileIngestError>,
    ) -> Result<Vec<PathBuf>> {
        match fs::metadata(root).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(RetrieverError::invalid_config(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RetrieverError::PathNotFound {
                    path: root.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let mut files = Vec::new();
        let mut dir_stack = vec![root.to_path_buf()];

        while let Some(current_dir) = dir_stack.pop() {
            let mut read_dir = match fs::read_dir(&current_dir).await {
                Ok(rd) => rd,
                Err(e) if current_dir == root => return Err(e.into()),
                Err(e) => {
                    warn!("Failed to read directory {}: {}", current_dir.display(), e);
                    errors.push(FileIngestError::new(current_dir, &e.into()));
                    continue;
                }
            };

            loop {
                let entry = match read_dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to list {}: {}", current_dir.display(), e);
                        errors.push(FileIngestError::new(current_dir.clone(), &e.into()));
                        break;
                    }
                };
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("Failed to get file type for {}: {}", path.display(), e);
                        errors.push(FileIngestError::new(path, &e.into()));
                        continue;
                    }
                };

                if file_type.is_dir() {
                    dir_stack.push(path);
                    continue;
                }

                // Symlinks count when they point at a regular file
                let is_file = file_type.is_file()
                    || (file_type.is_symlink()
                        && fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false));
                if !is_file {
                    debug!("Skipping {} (not a regular file)", path.display());
                } else if loader::is_supported(&path) {
                    files.push(path);
                } else {
                    debug!("Skipping unsupported file {}", path.display());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// `path` relative to the knowledge root with `/` separators, or the full
    /// path when it lies outside the root.
    async fn source_for(&self, path: &Path) -> String {
        let root = &self.context.config().knowledge_dir;

        if let Ok(relative) = path.strip_prefix(root) {
            return slash_path(relative);
        }
        if let (Ok(canonical_path), Ok(canonical_root)) =
            (fs::canonicalize(path).await, fs::canonicalize(root).await)
        {
            if let Ok(relative) = canonical_path.strip_prefix(&canonical_root) {
                return slash_path(relative);
            }
        }

        warn!(
            "{} is outside the knowledge root {}, recording its full path",
            path.display(),
            root.display()
        );
        path.display().to_string()
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

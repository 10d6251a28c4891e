//! Error types for ingestion, indexing and retrieval

use std::path::PathBuf;
use studyrag_embed::EmbedError;

/// Result type for retriever operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Every failure the retriever reports to its callers.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// The file extension is not one of the supported document types
    #[error("Unsupported file type '{extension}'")]
    UnsupportedFileType {
        /// Dotted, lower-cased extension (`.docx`), or empty when there is none
        extension: String,
    },

    /// A caller-supplied path does not exist
    #[error("Path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    /// The embedding model could not be loaded or invoked
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    /// A persisted store exists but cannot be read back
    #[error("Failed to load index from {}: {reason}", path.display())]
    IndexLoadFailure { path: PathBuf, reason: String },

    /// A vector's length disagrees with the index dimension
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A PDF could not be parsed at all
    #[error("Failed to extract text from {}: {reason}", path.display())]
    PdfExtraction { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl RetrieverError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFileType { .. } => "unsupported_file_type",
            Self::PathNotFound { .. } => "path_not_found",
            Self::Embedding(_) => "embedding_failure",
            Self::IndexLoadFailure { .. } => "index_load_failure",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::PdfExtraction { .. } => "pdf_extraction",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn load_failure<S: Into<String>>(path: impl Into<PathBuf>, reason: S) -> Self {
        Self::IndexLoadFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<studyrag_context::SplitterError> for RetrieverError {
    fn from(err: studyrag_context::SplitterError) -> Self {
        Self::invalid_config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_messages() {
        let err = RetrieverError::UnsupportedFileType {
            extension: ".docx".to_string(),
        };
        assert_eq!(err.kind(), "unsupported_file_type");
        assert_eq!(err.to_string(), "Unsupported file type '.docx'");

        let err = RetrieverError::DimensionMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(err.kind(), "dimension_mismatch");
        assert_eq!(err.to_string(), "Dimension mismatch: index expects 4, got 3");

        let err: RetrieverError = EmbedError::LockPoisoned.into();
        assert_eq!(err.kind(), "embedding_failure");
    }

    #[test]
    fn test_splitter_error_is_config_error() {
        let err: RetrieverError = studyrag_context::SplitterError::ZeroChunkSize.into();
        assert_eq!(err.kind(), "invalid_config");
    }
}

//! Error types for the embedding system

use std::path::PathBuf;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Every variant counts as an embedding failure from the caller's point of
/// view: the model could not be loaded, could not be invoked, or produced
/// output that cannot be used as an embedding. Callers that only need a
/// dimension (index creation) treat any of these as "fall back to the
/// configured dimension".
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// A model file that should have been downloaded is missing
    #[error("Model file not found: {path}")]
    ModelFileNotFound { path: PathBuf },

    /// Model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The model returned a different number of vectors than texts it was given
    #[error("Model returned {actual} embeddings for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    /// The model produced vectors that cannot be used
    #[error("Invalid model output: {message}")]
    InvalidOutput { message: String },

    /// A previous inference panicked while holding the model lock
    #[error("Embedding model lock poisoned")]
    LockPoisoned,

    /// IO errors when reading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Errors surfaced by fastembed and other anyhow-based libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Wrap an error raised while loading a model.
    pub fn model_init<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelInitialization {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// A convenience `Result` alias using [`TastyError`].
pub type TastyResult<T> = Result<T, TastyError>;

/// Top-level error type for the TastyAI recommender.
///
/// Variants follow the failure domains of the pipeline: corpus ingestion,
/// embedding, the persisted cache, preference validation and the external
/// collaborators consumed around the core.
#[derive(Error, Debug)]
pub enum TastyError {
    /// The corpus file is unreadable, malformed, or lacks a required column.
    #[error("Corpus format error in '{}': {detail}", path.display())]
    CorpusFormat {
        /// Corpus file at fault.
        path: PathBuf,
        /// Which column or row is at fault.
        detail: String,
    },

    /// A query was embedded in a different space than the one bound to the store.
    #[error("Embedding space mismatch: store uses {expected}, query uses {found}")]
    EmbeddingSpaceMismatch {
        /// Space persisted with the store.
        expected: String,
        /// Space of the offending embedder or request.
        found: String,
    },

    /// The persisted matrix or its companions cannot be trusted.
    #[error(
        "Cache corruption at '{}': {reason} (delete the cache files and rebuild)",
        path.display()
    )]
    CacheCorruption {
        /// Cache artifact at fault.
        path: PathBuf,
        /// What was inconsistent.
        reason: String,
    },

    /// A preference object failed validation at construction time.
    #[error("Preference validation error: {0}")]
    PreferenceValidation(String),

    /// The embedding provider failed to produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A caller violated an operation precondition (e.g. `top_n == 0`).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An external collaborator (translation, extraction, image) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TastyError {
    /// Shorthand for a [`TastyError::CorpusFormat`] error.
    pub fn corpus(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::CorpusFormat {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Shorthand for a [`TastyError::CacheCorruption`] error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheCorruption {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the persisted cache should be deleted and rebuilt.
    pub fn is_cache_corruption(&self) -> bool {
        matches!(self, Self::CacheCorruption { .. })
    }
}

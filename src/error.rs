//! Error taxonomy for the indexing and retrieval core.
//!
//! Per-file extraction problems never surface here: the loader logs them and
//! skips the file. Everything in [`IndexError`] reaches the caller of
//! `refresh` / `search` as an explicit failure.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    /// A file, directory, ledger or artifact could not be read or written.
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scan produced no documents at all.
    #[error("no documents found under {}", root.display())]
    EmptyCorpus { root: PathBuf },

    /// Vector dimensionality (or chunk/vector cardinality) does not line up.
    ///
    /// Raised for an artifact built with another model's dimension, for a
    /// query vector of the wrong length, and for `build` inputs that do not
    /// pair one vector of uniform length with each chunk. Requires a reset
    /// when it comes from persisted state.
    #[error("dimension mismatch ({context}): expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// The persisted index was built with a different embedding model.
    #[error("index was built with model '{indexed}' but the provider is '{provider}'; run reset")]
    ModelMismatch { indexed: String, provider: String },

    /// No usable persisted index: missing, unreadable or corrupted.
    #[error("no usable index artifact at {}: {reason}", path.display())]
    IndexNotFound { path: PathBuf, reason: String },

    /// An embedding batch failed; the rebuild was aborted, ledger untouched.
    #[error("embedding provider failure: {0}")]
    EmbeddingProvider(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("index artifact storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("ledger encoding error: {0}")]
    Ledger(#[from] serde_json::Error),
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IndexError::IndexNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for the conditions that persist until an explicit `reset`.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            IndexError::DimensionMismatch { .. } | IndexError::ModelMismatch { .. }
        )
    }
}

//! Semantic index error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid entry metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// A stored vector does not match the embedder's width.
    #[error("Embedding dimension mismatch: expected {expected}, found {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index lock poisoned")]
    LockPoisoned,
}

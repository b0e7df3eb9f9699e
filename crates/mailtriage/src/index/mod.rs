//! Semantic index: embedded messages searchable by meaning.

pub mod embedder;
pub mod error;
pub mod store;

pub use embedder::{Embedder, HashEmbedder, DEFAULT_DIMENSION};
pub use error::IndexError;
pub use store::{EntryMetadata, SearchFilter, SearchHit, SemanticIndex};

use crate::analysis::Classification;
use crate::email::RawMessage;

/// Sink for classified messages keyed by message id.
///
/// Writing the same id twice replaces the earlier entry.
pub trait SemanticStore: Send + Sync {
    fn upsert(
        &self,
        message: &RawMessage,
        classification: &Classification,
    ) -> Result<(), IndexError>;
}

//! SQLite-backed vector index over processed messages.
//!
//! Each entry stores the embedded document, its vector as little-endian
//! `f32` bytes and a JSON metadata blob. Search is a brute-force cosine
//! scan, which is fine for a personal mailbox.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::embedder::{cosine_similarity, Embedder, HashEmbedder};
use super::error::IndexError;
use super::SemanticStore;
use crate::analysis::Classification;
use crate::email::RawMessage;

/// File name of the index inside the data directory.
pub const INDEX_FILE: &str = "semantic_index.db";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS entries (
    id          TEXT PRIMARY KEY,
    document    TEXT NOT NULL,
    embedding   BLOB NOT NULL,
    metadata    TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);";

/// Metadata stored alongside each embedded message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub sender: String,
    pub subject: String,
    pub thread_id: String,
    pub date: Option<String>,
    pub kind: String,
    pub domain: Option<String>,
    pub requires_reply: bool,
    pub summary: String,
}

impl EntryMetadata {
    fn from_parts(message: &RawMessage, classification: &Classification) -> Self {
        Self {
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            thread_id: message.thread_id.clone(),
            date: message.date.clone(),
            kind: classification.kind.as_str().to_string(),
            domain: classification.domain.map(|d| d.as_str().to_string()),
            requires_reply: classification.requires_reply,
            summary: classification.summary.clone(),
        }
    }
}

/// One search result. Lower distance is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub distance: f32,
    pub document: String,
    pub metadata: EntryMetadata,
}

/// Metadata constraints applied before ranking. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub sender: Option<String>,
    pub kind: Option<String>,
    pub domain: Option<String>,
    pub requires_reply: Option<bool>,
}

impl SearchFilter {
    fn matches(&self, metadata: &EntryMetadata) -> bool {
        if let Some(sender) = &self.sender {
            if !metadata.sender.eq_ignore_ascii_case(sender) {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if metadata.kind != *kind {
                return false;
            }
        }
        if let Some(domain) = &self.domain {
            if metadata.domain.as_deref() != Some(domain.as_str()) {
                return false;
            }
        }
        if let Some(reply) = self.requires_reply {
            if metadata.requires_reply != reply {
                return false;
            }
        }
        true
    }
}

/// Text embedded for a message: subject, body (or snippet) and summary.
pub fn document_text(message: &RawMessage, classification: &Classification) -> String {
    let mut parts: Vec<&str> = vec![message.subject.as_str()];
    let body = message.body_or_snippet();
    if !body.is_empty() {
        parts.push(body);
    }
    if !classification.summary.is_empty() {
        parts.push(classification.summary.as_str());
    }
    parts.join("\n\n")
}

/// Persistent vector index keyed by message id.
///
/// Cloning shares the underlying connection and embedder.
#[derive(Clone)]
pub struct SemanticIndex {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn Embedder>,
}

impl SemanticIndex {
    /// Opens (or creates) the index inside `dir`.
    pub fn open(dir: &Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(dir).map_err(|e| IndexError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let path = dir.join(INDEX_FILE);
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        log::info!("Semantic index opened at {}", path.display());
        Ok(Self::from_conn(conn))
    }

    /// Opens an empty in-memory index.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder: Arc::new(HashEmbedder::default()),
        }
    }

    /// Replaces the embedder. Entries written with a different width are
    /// rejected at search time.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&Connection) -> Result<T, IndexError>,
    {
        let conn = self.conn.lock().map_err(|_| IndexError::LockPoisoned)?;
        f(&conn)
    }

    /// Inserts or replaces the entry for `message.id`.
    pub fn upsert(
        &self,
        message: &RawMessage,
        classification: &Classification,
    ) -> Result<(), IndexError> {
        let document = document_text(message, classification);
        let embedding = self.embedder.embed(&document)?;
        let metadata = serde_json::to_string(&EntryMetadata::from_parts(message, classification))?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO entries (id, document, embedding, metadata)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    document = excluded.document,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata,
                    updated_at = datetime('now')",
                params![message.id, document, encode_vector(&embedding), metadata],
            )?;
            Ok(())
        })
    }

    /// Up to `limit` entries closest to `query`, nearest first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.search_with_filter(query, limit, &SearchFilter::default())
    }

    /// Like [`search`](Self::search) but only over entries passing `filter`.
    pub fn search_with_filter(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if limit == 0 || self.count()? == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query)?;
        let expected = self.embedder.dimension();

        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, document, embedding, metadata FROM entries")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut hits = Vec::new();
        for (id, document, blob, metadata) in rows {
            let metadata: EntryMetadata = serde_json::from_str(&metadata)?;
            if !filter.matches(&metadata) {
                continue;
            }
            let embedding = decode_vector(&blob, expected)?;
            hits.push(SearchHit {
                id,
                distance: 1.0 - cosine_similarity(&query_vec, &embedding),
                document,
                metadata,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Metadata for one entry.
    pub fn get(&self, id: &str) -> Result<Option<EntryMetadata>, IndexError> {
        let raw = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT metadata FROM entries WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?)
        })?;
        raw.map(|json| serde_json::from_str(&json).map_err(IndexError::from))
            .transpose()
    }

    pub fn count(&self) -> Result<usize, IndexError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
            Ok(n as usize)
        })
    }
}

impl SemanticStore for SemanticIndex {
    fn upsert(
        &self,
        message: &RawMessage,
        classification: &Classification,
    ) -> Result<(), IndexError> {
        SemanticIndex::upsert(self, message, classification)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8], expected: usize) -> Result<Vec<f32>, IndexError> {
    if blob.len() != expected * 4 {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: blob.len() / 4,
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

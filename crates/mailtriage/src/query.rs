//! Read-side queries spanning the relational store and the semantic index.

use std::collections::HashSet;

use thiserror::Error;

use crate::db::{
    message_repo, tracking_repo, Database, DatabaseError, Deadline, FollowUp, StoredMessage,
};
use crate::index::{IndexError, SearchFilter, SearchHit, SemanticIndex};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// Both stores behind one handle. Clones share the underlying connections.
#[derive(Clone)]
pub struct QueryEngine {
    db: Database,
    index: SemanticIndex,
}

impl QueryEngine {
    pub fn new(db: Database, index: SemanticIndex) -> Self {
        Self { db, index }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    /// Semantic search, nearest first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        Ok(self.index.search(query, limit)?)
    }

    pub fn search_with_filter(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.index.search_with_filter(query, limit, filter)?)
    }

    /// Stored rows for the messages closest to `topic`.
    ///
    /// Indexed messages with no stored row are skipped.
    pub fn messages_for_topic(&self, topic: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let hits = self.index.search(topic, limit)?;
        let mut rows = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(row) = message_repo::get_by_id(&self.db, &hit.id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    pub fn ids_processed_since(&self, days: u32) -> Result<HashSet<String>> {
        Ok(message_repo::ids_processed_since(&self.db, days)?)
    }

    pub fn messages_needing_reply(&self, hours: u32) -> Result<Vec<StoredMessage>> {
        Ok(message_repo::messages_needing_reply(&self.db, hours)?)
    }

    /// Pending follow-ups with their source message, when still stored.
    pub fn pending_follow_ups(&self) -> Result<Vec<(FollowUp, Option<StoredMessage>)>> {
        tracking_repo::pending_follow_ups(&self.db)?
            .into_iter()
            .map(|f| {
                let row = message_repo::get_by_id(&self.db, &f.message_id)?;
                Ok((f, row))
            })
            .collect()
    }

    /// Open deadlines with their source message, when still stored.
    pub fn open_deadlines(&self) -> Result<Vec<(Deadline, Option<StoredMessage>)>> {
        tracking_repo::open_deadlines(&self.db)?
            .into_iter()
            .map(|d| {
                let row = message_repo::get_by_id(&self.db, &d.message_id)?;
                Ok((d, row))
            })
            .collect()
    }
}

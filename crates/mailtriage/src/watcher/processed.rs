//! In-memory tracking of handled message ids for one connection.

use std::collections::HashSet;

use log::debug;

use crate::email::RawMessage;

/// Ids already handed to the processor, or skipped as pre-existing backlog.
///
/// Rebuilt from scratch on every reconnect.
#[derive(Debug, Default)]
pub struct ProcessedIds {
    ids: HashSet<String>,
}

impl ProcessedIds {
    /// Starts from a snapshot of ids that must never be processed.
    pub fn seeded<I>(backlog: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let ids: HashSet<String> = backlog.into_iter().collect();
        debug!("Seeded {} backlog ids", ids.len());
        Self { ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Marks an id as handled. Returns false if it already was.
    pub fn mark(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    /// Keeps only messages not yet handled, preserving order and dropping
    /// repeats within the batch.
    pub fn filter_unprocessed(&self, messages: Vec<RawMessage>) -> Vec<RawMessage> {
        let mut in_batch = HashSet::new();
        let fresh: Vec<RawMessage> = messages
            .into_iter()
            .filter(|m| !self.ids.contains(&m.id) && in_batch.insert(m.id.clone()))
            .collect();
        debug!("{} unprocessed messages in batch", fresh.len());
        fresh
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

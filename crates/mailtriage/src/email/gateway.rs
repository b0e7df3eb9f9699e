//! Capability interface the core depends on for mailbox access.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::Result;
use super::message::RawMessage;

/// Default cap for unread-id seeding and date-range fetches.
pub const DEFAULT_SEED_BATCH: usize = 500;

/// Default cap for one poll's unread fetch.
pub const DEFAULT_POLL_BATCH: usize = 50;

/// One live mailbox session.
///
/// Implementations hold a single long-lived connection; reconnecting is
/// the watcher's job. Labels are plain names here, any id mapping stays
/// private to the implementation.
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Identifiers of unread messages, without fetching content.
    async fn list_unread_ids(&self, max: usize) -> Result<Vec<String>>;

    /// Unread messages with bodies.
    async fn list_unread_messages(&self, max: usize) -> Result<Vec<RawMessage>>;

    /// Messages (read or unread) received within the last `days` days.
    async fn list_messages_since(&self, days: u32, max: usize) -> Result<Vec<RawMessage>>;

    /// A single message with body. Fails with `NotFound` if absent.
    async fn get_message(&self, id: &str) -> Result<RawMessage>;

    /// Adds a label, creating it first if needed. Idempotent.
    async fn apply_label(&self, id: &str, label: &str) -> Result<()>;

    /// Removes a label. No-op if the label does not exist.
    async fn remove_label(&self, id: &str, label: &str) -> Result<()>;

    async fn star(&self, id: &str) -> Result<()>;

    /// Creates every missing label in `names`, in order. Idempotent.
    async fn ensure_labels(&self, names: &[String]) -> Result<()>;

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;

    /// Tears the session down. Called once when the session ends.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens fresh gateway sessions. The watcher calls this once per
/// connect attempt.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MailboxGateway>>;
}

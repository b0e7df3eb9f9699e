//! Message repository: the `messages` table and the atomic save.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{contact_repo, tracking_repo, Database, DatabaseError};
use crate::analysis::{Classification, Domain, MessageKind};
use crate::email::RawMessage;

const SELECT_COLUMNS: &str = "id, thread_id, sender, recipient, subject, snippet, body, labels,
     date, web_link, kind, domain, summary, requires_reply, deadline, entities, processed_at";

/// A stored message with its latest classification.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub message: RawMessage,
    pub kind: MessageKind,
    pub domain: Option<Domain>,
    pub summary: String,
    pub requires_reply: bool,
    pub deadline: Option<String>,
    pub entities: Vec<String>,
    /// SQLite `datetime('now')` of the first save.
    pub processed_at: String,
}

impl StoredMessage {
    /// Rebuilds the classification recorded with this row.
    pub fn classification(&self) -> Classification {
        Classification {
            message_id: self.message.id.clone(),
            kind: self.kind,
            domain: self.domain,
            entities: self.entities.clone(),
            summary: self.summary.clone(),
            requires_reply: self.requires_reply,
            deadline: self.deadline.clone(),
        }
    }
}

/// Persists a message and its classification in one transaction.
///
/// Re-saving an id refreshes the classification columns and bumps the
/// sender's contact stats, but follow-up and deadline rows are only
/// created the first time an id is stored.
pub fn save(
    db: &Database,
    message: &RawMessage,
    classification: &Classification,
) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        let is_new = !exists(tx, &message.id)?;

        upsert(tx, message, classification)?;
        contact_repo::record_contact(tx, &message.sender, message.date.as_deref())?;

        if is_new {
            if classification.requires_reply {
                tracking_repo::insert_follow_up(tx, &message.id)?;
            }
            if let Some(deadline) = classification.deadline_text() {
                tracking_repo::insert_deadline(tx, &message.id, deadline)?;
            }
        }

        log::debug!(
            "Saved message {} (new: {}, reply: {})",
            message.id,
            is_new,
            classification.requires_reply
        );
        Ok(())
    })
}

fn exists(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let found = conn
        .query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn upsert(
    conn: &Connection,
    message: &RawMessage,
    classification: &Classification,
) -> Result<(), DatabaseError> {
    let labels = to_json("labels", &message.labels)?;
    let entities = to_json("entities", &classification.entities)?;

    conn.execute(
        "INSERT INTO messages
            (id, thread_id, sender, recipient, subject, snippet, body, labels, date, web_link,
             kind, domain, summary, requires_reply, deadline, entities)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(id) DO UPDATE SET
            kind           = excluded.kind,
            domain         = excluded.domain,
            summary        = excluded.summary,
            requires_reply = excluded.requires_reply,
            deadline       = excluded.deadline,
            entities       = excluded.entities",
        params![
            message.id,
            message.thread_id,
            message.sender,
            message.recipient,
            message.subject,
            message.snippet,
            message.body,
            labels,
            message.date,
            message.web_link,
            classification.kind.as_str(),
            classification.domain.map(|d| d.as_str()),
            classification.summary,
            classification.requires_reply,
            classification.deadline_text(),
            entities,
        ],
    )?;
    Ok(())
}

/// Finds a stored message by id.
pub fn get_by_id(db: &Database, id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
    db.with_conn(|conn| find_by_id(conn, id))
}

pub(crate) fn find_by_id(
    conn: &Connection,
    id: &str,
) -> Result<Option<StoredMessage>, DatabaseError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM messages WHERE id = ?1");
    let raw = conn
        .query_row(&sql, params![id], RawRow::from_row)
        .optional()?;
    raw.map(RawRow::into_stored).transpose()
}

/// Ids of messages first stored within the last `days` days.
pub fn ids_processed_since(db: &Database, days: u32) -> Result<HashSet<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT id FROM messages WHERE processed_at >= datetime('now', ?1)")?;
        let ids = stmt
            .query_map(params![format!("-{days} days")], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    })
}

/// Human messages flagged reply-required and stored within the last
/// `hours` hours, newest first.
pub fn messages_needing_reply(
    db: &Database,
    hours: u32,
) -> Result<Vec<StoredMessage>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM messages
             WHERE kind = 'human' AND requires_reply = 1
               AND processed_at >= datetime('now', ?1)
             ORDER BY processed_at DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![format!("-{hours} hours")], RawRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_stored).collect()
    })
}

/// Counts stored messages.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
        Ok(count)
    })
}

/// Every stored message, oldest first.
pub fn all(db: &Database) -> Result<Vec<StoredMessage>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM messages ORDER BY processed_at, id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], RawRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_stored).collect()
    })
}

fn to_json(column: &'static str, values: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(values).map_err(|e| DatabaseError::Json { column, source: e })
}

fn from_json(column: &'static str, text: &str) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(text).map_err(|e| DatabaseError::Json { column, source: e })
}

/// Column values as read, before enum and JSON decoding.
struct RawRow {
    id: String,
    thread_id: String,
    sender: String,
    recipient: Option<String>,
    subject: String,
    snippet: String,
    body: Option<String>,
    labels: String,
    date: Option<String>,
    web_link: Option<String>,
    kind: String,
    domain: Option<String>,
    summary: String,
    requires_reply: bool,
    deadline: Option<String>,
    entities: String,
    processed_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            sender: row.get(2)?,
            recipient: row.get(3)?,
            subject: row.get(4)?,
            snippet: row.get(5)?,
            body: row.get(6)?,
            labels: row.get(7)?,
            date: row.get(8)?,
            web_link: row.get(9)?,
            kind: row.get(10)?,
            domain: row.get(11)?,
            summary: row.get(12)?,
            requires_reply: row.get(13)?,
            deadline: row.get(14)?,
            entities: row.get(15)?,
            processed_at: row.get(16)?,
        })
    }

    fn into_stored(self) -> Result<StoredMessage, DatabaseError> {
        let invalid = |column: &'static str, value: &str| DatabaseError::InvalidValue {
            column,
            value: value.to_string(),
        };
        let kind = self
            .kind
            .parse::<MessageKind>()
            .map_err(|_| invalid("kind", &self.kind))?;
        let domain = match self.domain.as_deref() {
            Some(d) => Some(d.parse::<Domain>().map_err(|_| invalid("domain", d))?),
            None => None,
        };

        Ok(StoredMessage {
            message: RawMessage {
                id: self.id,
                thread_id: self.thread_id,
                sender: self.sender,
                recipient: self.recipient,
                subject: self.subject,
                snippet: self.snippet,
                body: self.body,
                labels: from_json("labels", &self.labels)?,
                date: self.date,
                web_link: self.web_link,
            },
            kind,
            domain,
            summary: self.summary,
            requires_reply: self.requires_reply,
            deadline: self.deadline,
            entities: from_json("entities", &self.entities)?,
            processed_at: self.processed_at,
        })
    }
}

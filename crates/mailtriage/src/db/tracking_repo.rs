//! Follow-up and deadline tracking rows.
//!
//! Rows are created by the first save of a message. Their status is only
//! ever changed by callers outside the processing pipeline.

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// Status of a follow-up row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpStatus {
    Pending,
    Done,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpStatus::Pending => "pending",
            FollowUpStatus::Done => "done",
        }
    }
}

impl fmt::Display for FollowUpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FollowUpStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FollowUpStatus::Pending),
            "done" => Ok(FollowUpStatus::Done),
            other => Err(DatabaseError::InvalidValue {
                column: "follow_ups.status",
                value: other.to_string(),
            }),
        }
    }
}

/// Status of a deadline row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    Open,
    Closed,
}

impl DeadlineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadlineStatus::Open => "open",
            DeadlineStatus::Closed => "closed",
        }
    }
}

impl FromStr for DeadlineStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(DeadlineStatus::Open),
            "closed" => Ok(DeadlineStatus::Closed),
            other => Err(DatabaseError::InvalidValue {
                column: "deadlines.status",
                value: other.to_string(),
            }),
        }
    }
}

/// A message awaiting a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub id: i64,
    pub message_id: String,
    pub status: FollowUpStatus,
    pub notes: Option<String>,
    pub created_at: String,
}

/// A deadline mentioned in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    pub id: i64,
    pub message_id: String,
    pub description: String,
    pub status: DeadlineStatus,
    pub created_at: String,
}

pub(crate) fn insert_follow_up(conn: &Connection, message_id: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO follow_ups (message_id) VALUES (?1)",
        params![message_id],
    )?;
    Ok(())
}

pub(crate) fn insert_deadline(
    conn: &Connection,
    message_id: &str,
    description: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO deadlines (message_id, description) VALUES (?1, ?2)",
        params![message_id, description],
    )?;
    Ok(())
}

/// Follow-ups with the given status, oldest first.
pub fn follow_ups(db: &Database, status: FollowUpStatus) -> Result<Vec<FollowUp>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, message_id, status, notes, created_at FROM follow_ups
             WHERE status = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![status.as_str()], raw_follow_up)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, message_id, status, notes, created_at)| {
                Ok(FollowUp {
                    id,
                    message_id,
                    status: status.parse()?,
                    notes,
                    created_at,
                })
            })
            .collect()
    })
}

type RawFollowUp = (i64, String, String, Option<String>, String);

fn raw_follow_up(row: &Row<'_>) -> rusqlite::Result<RawFollowUp> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

/// Follow-ups still waiting for a reply.
pub fn pending_follow_ups(db: &Database) -> Result<Vec<FollowUp>, DatabaseError> {
    follow_ups(db, FollowUpStatus::Pending)
}

/// Open deadlines, oldest first.
pub fn open_deadlines(db: &Database) -> Result<Vec<Deadline>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, message_id, description, status, created_at FROM deadlines
             WHERE status = 'open' ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, message_id, description, status, created_at)| {
                Ok(Deadline {
                    id,
                    message_id,
                    description,
                    status: status.parse()?,
                    created_at,
                })
            })
            .collect()
    })
}

/// Marks a follow-up as done. Returns false if no pending follow-up exists
/// with that id.
pub fn complete_follow_up(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE follow_ups SET status = 'done' WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        Ok(changed > 0)
    })
}

/// Closes a deadline. Returns false if no open deadline exists with that id.
pub fn close_deadline(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE deadlines SET status = 'closed' WHERE id = ?1 AND status = 'open'",
            params![id],
        )?;
        Ok(changed > 0)
    })
}

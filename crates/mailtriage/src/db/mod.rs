//! Relational store for classified messages.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction};

use crate::analysis::Classification;
use crate::email::RawMessage;

pub mod contact_repo;
pub mod error;
pub mod message_repo;
pub mod migrations;
pub mod tracking_repo;

pub use contact_repo::Contact;
pub use error::DatabaseError;
pub use message_repo::StoredMessage;
pub use tracking_repo::{Deadline, DeadlineStatus, FollowUp, FollowUpStatus};

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). All access is serialized through
/// a `Mutex`, which is fine for SQLite (which serializes writes anyway).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&mut conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside one transaction under the lock.
    ///
    /// Commits when `f` returns `Ok`; any error rolls everything back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Durable sink for classified messages.
pub trait MessageStore: Send + Sync {
    /// Persists one message and its classification atomically.
    fn save(
        &self,
        message: &RawMessage,
        classification: &Classification,
    ) -> Result<(), DatabaseError>;
}

impl MessageStore for Database {
    fn save(
        &self,
        message: &RawMessage,
        classification: &Classification,
    ) -> Result<(), DatabaseError> {
        message_repo::save(self, message, classification)
    }
}

/// Returns the application data directory: `~/.mailtriage/data`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mailtriage").join("data"))
}

/// Returns the canonical database path: `~/.mailtriage/data/mailtriage.db`.
pub fn default_database_path() -> Option<PathBuf> {
    default_data_dir().map(|d| d.join("mailtriage.db"))
}

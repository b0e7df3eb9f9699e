//! Contact repository: per-sender aggregates.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DatabaseError};

/// Aggregate for one sender address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub address: String,
    pub total_emails: u64,
    /// Date of the most recent message, as reported by the mailbox.
    pub last_contact: Option<String>,
}

/// Counts one more message from `address`.
///
/// Falls back to the current time when the message carries no date.
pub(crate) fn record_contact(
    conn: &Connection,
    address: &str,
    date: Option<&str>,
) -> Result<(), DatabaseError> {
    let last_contact = match date {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => chrono::Utc::now().to_rfc3339(),
    };
    conn.execute(
        "INSERT INTO contacts (address, total_emails, last_contact)
         VALUES (?1, 1, ?2)
         ON CONFLICT(address) DO UPDATE SET
            total_emails = total_emails + 1,
            last_contact = excluded.last_contact",
        params![address, last_contact],
    )?;
    Ok(())
}

/// Looks up the aggregate for a sender address.
pub fn contact(db: &Database, address: &str) -> Result<Option<Contact>, DatabaseError> {
    db.with_conn(|conn| {
        let found = conn
            .query_row(
                "SELECT address, total_emails, last_contact FROM contacts WHERE address = ?1",
                params![address],
                |row| {
                    Ok(Contact {
                        address: row.get(0)?,
                        total_emails: row.get(1)?,
                        last_contact: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_contact_increments() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            record_contact(conn, "bob@example.com", Some("Mon, 1 Jan 2026"))?;
            record_contact(conn, "bob@example.com", Some("Tue, 2 Jan 2026"))
        })
        .unwrap();

        let contact = contact(&db, "bob@example.com").unwrap().unwrap();
        assert_eq!(contact.total_emails, 2);
        assert_eq!(contact.last_contact.as_deref(), Some("Tue, 2 Jan 2026"));
    }

    #[test]
    fn test_missing_date_uses_now() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| record_contact(conn, "c@example.com", None))
            .unwrap();
        let contact = contact(&db, "c@example.com").unwrap().unwrap();
        assert!(contact.last_contact.unwrap().starts_with("20"));
    }

    #[test]
    fn test_unknown_contact() {
        let db = Database::open_in_memory().unwrap();
        assert!(contact(&db, "nobody@example.com").unwrap().is_none());
    }
}

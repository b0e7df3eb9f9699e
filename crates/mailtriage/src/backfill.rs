//! One-shot catch-up over recent mail, and index rebuilds.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::analysis::{MessageProcessor, ProcessOutcome};
use crate::db::{message_repo, Database, DatabaseError};
use crate::email::{GatewayError, MailboxGateway};
use crate::index::{IndexError, SemanticIndex};

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Counts from one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Messages returned by the gateway.
    pub fetched: usize,
    /// Already stored within the window.
    pub skipped: usize,
    /// Handed to the processor and classified.
    pub processed: usize,
    /// Handed to the processor but skipped, failed or panicked.
    pub failed: usize,
}

/// Processes mail from the last `days` days that is not stored yet.
///
/// Messages run through `processor` one at a time in gateway order. A
/// processor failure is counted, never propagated.
pub async fn backfill(
    gateway: &dyn MailboxGateway,
    processor: &dyn MessageProcessor,
    db: &Database,
    days: u32,
    max: usize,
) -> Result<BackfillReport, BackfillError> {
    let stored = message_repo::ids_processed_since(db, days)?;
    let messages = gateway.list_messages_since(days, max).await?;

    let mut report = BackfillReport {
        fetched: messages.len(),
        ..BackfillReport::default()
    };

    for message in messages {
        if stored.contains(&message.id) {
            report.skipped += 1;
            continue;
        }

        let result = AssertUnwindSafe(processor.process(&message))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(ProcessOutcome::Completed { .. })) => report.processed += 1,
            Ok(Ok(ProcessOutcome::Skipped)) => {
                warn!(message_id = %message.id, "backfill: classification skipped");
                report.failed += 1;
            }
            Ok(Err(e)) => {
                error!(message_id = %message.id, error = %e, "backfill: processing failed");
                report.failed += 1;
            }
            Err(_) => {
                error!(message_id = %message.id, "backfill: processor panicked");
                report.failed += 1;
            }
        }
    }

    info!(
        days,
        fetched = report.fetched,
        skipped = report.skipped,
        processed = report.processed,
        failed = report.failed,
        "backfill complete"
    );
    Ok(report)
}

/// Re-embeds every stored message into `index`. Returns the number indexed.
pub fn reindex(db: &Database, index: &SemanticIndex) -> Result<usize, BackfillError> {
    let rows = message_repo::all(db)?;
    for row in &rows {
        index.upsert(&row.message, &row.classification())?;
    }
    info!(count = rows.len(), "reindex complete");
    Ok(rows.len())
}

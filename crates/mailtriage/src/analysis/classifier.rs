//! Classifier capability.

use async_trait::async_trait;
use thiserror::Error;

use super::types::Classification;
use crate::email::RawMessage;

/// Failure to produce a valid classification for one message.
///
/// Per-message: the processor skips the message's side effects and moves on.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Classifier API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The model answered without the expected tool call.
    #[error("No analysis tool call for message '{message_id}' (stop_reason={stop_reason})")]
    MissingToolCall {
        message_id: String,
        stop_reason: String,
    },

    #[error("Malformed analysis for message '{message_id}': {reason}")]
    Malformed { message_id: String, reason: String },

    #[error("Classifier not configured: {0}")]
    Config(String),
}

/// Produces a structured [`Classification`] for one message.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, message: &RawMessage) -> Result<Classification, ClassifyError>;
}

//! Mailbox message as returned by the gateway, before classification.

use serde::{Deserialize, Serialize};

/// Placeholder subject used when the gateway reports none.
pub const NO_SUBJECT: &str = "(no subject)";

/// Number of body characters kept as the snippet when the gateway
/// only returns a full body.
pub const SNIPPET_CHARS: usize = 200;

/// An email as returned by the mailbox gateway.
///
/// Lightweight list results carry no `body`; full fetches populate
/// `body`, `recipient` and `date` as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Stable, mailbox-unique identifier.
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    pub sender: String,
    #[serde(default)]
    pub recipient: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Send date as reported by the gateway (free text or ISO 8601).
    #[serde(default)]
    pub date: Option<String>,
    /// Permalink to the message in the mailbox web UI.
    #[serde(default)]
    pub web_link: Option<String>,
}

impl RawMessage {
    /// Creates a message with the required fields; optional fields are empty.
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: String::new(),
            sender: sender.into(),
            recipient: None,
            subject: subject.into(),
            snippet: String::new(),
            body: None,
            labels: Vec::new(),
            date: None,
            web_link: None,
        }
    }

    /// Returns the body if present and non-empty, otherwise the snippet.
    pub fn body_or_snippet(&self) -> &str {
        match self.body.as_deref() {
            Some(body) if !body.is_empty() => body,
            _ => &self.snippet,
        }
    }
}

/// Truncates `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

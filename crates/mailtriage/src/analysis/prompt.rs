//! Classifier prompt construction.

use tracing::debug;

use crate::email::message::{truncate_chars, RawMessage};

/// Maximum body characters sent to the model, counted after HTML stripping.
pub const BODY_CHAR_LIMIT: usize = 4_000;

/// Appended when the body was cut at [`BODY_CHAR_LIMIT`].
pub const TRUNCATION_MARKER: &str = "[… email truncated …]";

const INSTRUCTION: &str =
    "Analyse the following email and call record_email_analysis with your findings.";

/// Line width handed to the HTML renderer. Lines are re-joined afterwards,
/// so this only needs to be wide enough not to split long tokens.
const RENDER_WIDTH: usize = 1_000;

/// Returns the visible text of an HTML document.
///
/// Rendered with `html2text` (character references decoded) and collapsed
/// to single spaces. Input without markup is returned unchanged, as is any
/// input where rendering fails or leaves 10% or less of the original length.
pub fn strip_html(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }

    let rendered = match html2text::from_read(text.as_bytes(), RENDER_WIDTH) {
        Ok(rendered) => rendered,
        Err(e) => {
            debug!(error = %e, "HTML rendering failed, using raw body");
            return text.to_string();
        }
    };

    let result = rendered.split_whitespace().collect::<Vec<_>>().join(" ");
    if result.chars().count() * 10 > text.chars().count() {
        result
    } else {
        text.to_string()
    }
}

/// Builds the single user turn sent to the classifier.
///
/// Falls back to the snippet when no body is available.
pub fn build_user_content(message: &RawMessage) -> String {
    let plain = strip_html(message.body_or_snippet());
    let preview = truncate_chars(&plain, BODY_CHAR_LIMIT);
    let truncated = preview.len() < plain.len();

    let mut lines = vec![
        format!("From: {}", message.sender),
        format!("Subject: {}", message.subject),
    ];
    if let Some(to) = message.recipient.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("To: {to}"));
    }
    if let Some(date) = message.date.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Date: {date}"));
    }
    lines.push(String::new());
    lines.push(preview.to_string());
    if truncated {
        lines.push(format!("\n{TRUNCATION_MARKER}"));
    }

    format!("{INSTRUCTION}\n\n{}", lines.join("\n"))
}

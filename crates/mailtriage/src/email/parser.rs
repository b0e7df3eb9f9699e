//! Parsers for the mailbox server's tool responses.
//!
//! The server answers either with formatted text blocks:
//!
//! ```text
//! Message ID: abc123
//! Subject: Hello
//! From: alice@example.com
//! Date: Mon, 1 Jan 2026 12:00:00 +0000
//! To: <bob@example.com>
//! Web Link: https://mail.google.com/...
//!
//! Body text follows after a blank line...
//! ```
//!
//! or, in older releases, with JSON lists of message objects. Both are
//! accepted.

use std::collections::HashMap;
use std::sync::LazyLock;

use log::warn;
use regex::Regex;
use serde_json::Value;

use super::mcp::ToolOutput;
use super::message::{truncate_chars, RawMessage, NO_SUBJECT, SNIPPET_CHARS};

static RE_MESSAGE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Message ID:\s*(\S+)").unwrap());
static RE_BLOCK_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Message ID:").unwrap());
static RE_HEADER_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static RE_LABEL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"•\s+(.+?)\s+\(ID:\s+(.+?)\)").unwrap());

/// Extracts message ids from a search response.
pub fn parse_search_ids(output: &ToolOutput) -> Vec<String> {
    match output {
        ToolOutput::Json(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("message_id").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
        ToolOutput::Text(text) => RE_MESSAGE_ID
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Parses one or more messages from a content response.
pub fn parse_messages(output: &ToolOutput) -> Vec<RawMessage> {
    match output {
        ToolOutput::Json(Value::Array(items)) => items
            .iter()
            .filter(|item| item.is_object())
            .map(message_from_json)
            .collect(),
        ToolOutput::Json(item @ Value::Object(_)) => vec![message_from_json(item)],
        ToolOutput::Text(text) => parse_text_blocks(text),
        _ => Vec::new(),
    }
}

/// Builds the label name → id map from a label listing.
pub fn parse_labels(output: &ToolOutput) -> Option<HashMap<String, String>> {
    match output {
        ToolOutput::Json(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name")?.as_str()?;
                    let id = item.get("id")?.as_str()?;
                    Some((name.to_string(), id.to_string()))
                })
                .collect(),
        ),
        ToolOutput::Text(text) => Some(
            RE_LABEL_LINE
                .captures_iter(text)
                .map(|c| (c[1].to_string(), c[2].to_string()))
                .collect(),
        ),
        other => {
            warn!("Unexpected label listing response: {:?}", other);
            None
        }
    }
}

fn parse_text_blocks(text: &str) -> Vec<RawMessage> {
    let starts: Vec<usize> = RE_BLOCK_START.find_iter(text).map(|m| m.start()).collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            parse_text_block(text[start..end].trim())
        })
        .collect()
}

fn parse_text_block(block: &str) -> Option<RawMessage> {
    let (header_text, body) = match RE_HEADER_END.find(block) {
        Some(m) => (&block[..m.start()], block[m.end()..].trim()),
        None => (block, ""),
    };

    let mut headers: HashMap<&str, &str> = HashMap::new();
    for line in header_text.lines() {
        if let Some((name, value)) = line.split_once(':') {
            headers.entry(name.trim()).or_insert_with(|| value.trim());
        }
    }
    let header = |name: &str| -> Option<String> {
        headers
            .get(name)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    };

    let id = header("Message ID")?;
    let recipient = header("To").map(|to| {
        let to = to.strip_prefix('<').unwrap_or(&to);
        to.strip_suffix('>').unwrap_or(to).to_string()
    });

    Some(RawMessage {
        id,
        thread_id: String::new(),
        sender: header("From").unwrap_or_default(),
        recipient,
        subject: header("Subject").unwrap_or_else(|| NO_SUBJECT.to_string()),
        snippet: truncate_chars(body, SNIPPET_CHARS).to_string(),
        body: (!body.is_empty()).then(|| body.to_string()),
        labels: Vec::new(),
        date: header("Date"),
        web_link: header("Web Link"),
    })
}

fn message_from_json(data: &Value) -> RawMessage {
    let text = |key: &str| -> Option<String> {
        match data.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    };

    RawMessage {
        id: text("message_id").or_else(|| text("id")).unwrap_or_default(),
        thread_id: text("thread_id").unwrap_or_default(),
        sender: text("from").unwrap_or_default(),
        recipient: text("to"),
        subject: text("subject").unwrap_or_else(|| NO_SUBJECT.to_string()),
        snippet: text("snippet").unwrap_or_default(),
        body: text("body"),
        labels: data
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        date: text("date"),
        web_link: text("web_link"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BATCH: &str = "Message ID: abc123
Subject: Lunch?
From: alice@example.com
Date: Mon, 1 Jan 2026 12:00:00 +0000
To: <bob@example.com>
Web Link: https://mail.google.com/mail/#all/abc123

Are you free tomorrow?
Bring the slides.

Message ID: def456
From: noreply@shop.example
To: bob@example.com
";

    #[test]
    fn test_parse_search_ids_from_text() {
        let output = ToolOutput::Text(
            "Found 2 messages:\nMessage ID: 18c1\nThread ID: t1\nMessage ID: 18c2\n".into(),
        );
        assert_eq!(parse_search_ids(&output), vec!["18c1", "18c2"]);
    }

    #[test]
    fn test_parse_search_ids_from_json() {
        let output = ToolOutput::Json(json!([
            {"message_id": "a"},
            {"message_id": ""},
            {"other": "x"},
            {"message_id": "b"}
        ]));
        assert_eq!(parse_search_ids(&output), vec!["a", "b"]);
        assert!(parse_search_ids(&ToolOutput::Empty).is_empty());
    }

    #[test]
    fn test_parse_text_blocks() {
        let messages = parse_messages(&ToolOutput::Text(BATCH.into()));
        assert_eq!(messages.len(), 2);

        let first = &messages[0];
        assert_eq!(first.id, "abc123");
        assert_eq!(first.subject, "Lunch?");
        assert_eq!(first.sender, "alice@example.com");
        assert_eq!(first.recipient.as_deref(), Some("bob@example.com"));
        assert_eq!(first.date.as_deref(), Some("Mon, 1 Jan 2026 12:00:00 +0000"));
        assert_eq!(
            first.web_link.as_deref(),
            Some("https://mail.google.com/mail/#all/abc123")
        );
        assert_eq!(
            first.body.as_deref(),
            Some("Are you free tomorrow?\nBring the slides.")
        );
        assert_eq!(first.snippet, "Are you free tomorrow?\nBring the slides.");

        let second = &messages[1];
        assert_eq!(second.id, "def456");
        assert_eq!(second.subject, NO_SUBJECT);
        assert_eq!(second.recipient.as_deref(), Some("bob@example.com"));
        assert!(second.body.is_none());
        assert!(second.snippet.is_empty());
    }

    #[test]
    fn test_snippet_is_truncated() {
        let body = "x".repeat(500);
        let text = format!("Message ID: long\nSubject: s\n\n{body}");
        let messages = parse_messages(&ToolOutput::Text(text));
        assert_eq!(messages[0].snippet.chars().count(), SNIPPET_CHARS);
        assert_eq!(messages[0].body.as_deref().map(str::len), Some(500));
    }

    #[test]
    fn test_parse_legacy_json_messages() {
        let output = ToolOutput::Json(json!([{
            "id": "m1",
            "thread_id": "t1",
            "from": "alice@example.com",
            "to": "bob@example.com",
            "snippet": "hi",
            "labels": ["INBOX", "UNREAD"]
        }]));
        let messages = parse_messages(&output);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[0].thread_id, "t1");
        assert_eq!(messages[0].subject, NO_SUBJECT);
        assert_eq!(messages[0].labels, vec!["INBOX", "UNREAD"]);
        assert!(messages[0].body.is_none());
    }

    #[test]
    fn test_parse_labels_text_and_json() {
        let text = ToolOutput::Text(
            "System labels:\n  • INBOX (ID: INBOX)\nUser labels:\n  • AI/Human/FollowUp (ID: Label_12)\n"
                .into(),
        );
        let labels = parse_labels(&text).unwrap();
        assert_eq!(labels.get("INBOX").map(String::as_str), Some("INBOX"));
        assert_eq!(
            labels.get("AI/Human/FollowUp").map(String::as_str),
            Some("Label_12")
        );

        let json = ToolOutput::Json(json!([{"name": "AI", "id": "Label_1"}, {"name": "bad"}]));
        let labels = parse_labels(&json).unwrap();
        assert_eq!(labels.len(), 1);

        assert!(parse_labels(&ToolOutput::Empty).is_none());
    }
}

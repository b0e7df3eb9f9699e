//! Builders for messages and classifications.

#![allow(dead_code)]

use mailtriage::analysis::{Classification, Domain, MessageKind};
use mailtriage::RawMessage;

/// A message with a body, as a full fetch would return it.
pub fn message(id: &str, sender: &str, subject: &str) -> RawMessage {
    let mut msg = RawMessage::new(id, sender, subject);
    msg.thread_id = format!("t-{}", id);
    msg.body = Some(format!("Body of {}", subject));
    msg.snippet = subject.to_string();
    msg.date = Some("2026-01-05T09:30:00Z".to_string());
    msg
}

/// Builder for `Classification` values.
pub struct ClassificationBuilder {
    inner: Classification,
}

impl ClassificationBuilder {
    pub fn human(message_id: &str) -> Self {
        Self {
            inner: Classification {
                message_id: message_id.to_string(),
                kind: MessageKind::Human,
                domain: None,
                entities: vec![],
                summary: String::new(),
                requires_reply: false,
                deadline: None,
            },
        }
    }

    pub fn automated(message_id: &str, domain: Domain) -> Self {
        Self {
            inner: Classification {
                message_id: message_id.to_string(),
                kind: MessageKind::Automated,
                domain: Some(domain),
                entities: vec![],
                summary: String::new(),
                requires_reply: false,
                deadline: None,
            },
        }
    }

    pub fn requires_reply(mut self) -> Self {
        self.inner.requires_reply = true;
        self
    }

    pub fn deadline(mut self, text: &str) -> Self {
        self.inner.deadline = Some(text.to_string());
        self
    }

    pub fn summary(mut self, text: &str) -> Self {
        self.inner.summary = text.to_string();
        self
    }

    pub fn entity(mut self, name: &str) -> Self {
        self.inner.entities.push(name.to_string());
        self
    }

    pub fn build(self) -> Classification {
        self.inner
    }
}

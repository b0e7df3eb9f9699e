//! Mapping from a classification to mailbox label operations.

use serde::{Deserialize, Serialize};

use super::types::{Classification, Domain, MessageKind};

/// One mailbox write derived from a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOp {
    Apply(String),
    Star,
}

impl LabelOp {
    /// Short name used in failure logs.
    pub fn describe(&self) -> String {
        match self {
            LabelOp::Apply(label) => format!("label '{label}'"),
            LabelOp::Star => "star".to_string(),
        }
    }
}

/// Label hierarchy written to the mailbox.
///
/// Defaults to an `AI/...` tree:
///
/// ```text
/// AI
/// ├── Human
/// │   └── FollowUp
/// └── Automated
///     ├── Finance
///     └── ... one label per domain
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelScheme {
    /// Root parent, never applied to messages directly.
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_human")]
    pub human: String,
    #[serde(default = "default_follow_up")]
    pub follow_up: String,
    /// Parent of the per-domain labels.
    #[serde(default = "default_automated")]
    pub automated: String,
    /// Also star human messages that need a reply.
    #[serde(default)]
    pub star_reply_required: bool,
}

fn default_root() -> String {
    "AI".to_string()
}

fn default_human() -> String {
    "AI/Human".to_string()
}

fn default_follow_up() -> String {
    "AI/Human/FollowUp".to_string()
}

fn default_automated() -> String {
    "AI/Automated".to_string()
}

impl Default for LabelScheme {
    fn default() -> Self {
        Self {
            root: default_root(),
            human: default_human(),
            follow_up: default_follow_up(),
            automated: default_automated(),
            star_reply_required: false,
        }
    }
}

impl LabelScheme {
    /// Label for an automated message of the given domain.
    pub fn domain_label(&self, domain: Domain) -> String {
        let name = domain.as_str();
        let mut chars = name.chars();
        let title: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        format!("{}/{}", self.automated, title)
    }

    /// Label operations for one classification, in application order.
    pub fn plan(&self, classification: &Classification) -> Vec<LabelOp> {
        match classification.kind {
            MessageKind::Human => {
                let mut ops = vec![LabelOp::Apply(self.human.clone())];
                if classification.requires_reply {
                    ops.push(LabelOp::Apply(self.follow_up.clone()));
                    if self.star_reply_required {
                        ops.push(LabelOp::Star);
                    }
                }
                ops
            }
            MessageKind::Automated => {
                let domain = classification.domain.unwrap_or(Domain::Other);
                vec![LabelOp::Apply(self.domain_label(domain))]
            }
        }
    }

    /// Every label of the scheme, parents before children.
    pub fn all_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        let candidates = [
            self.root.clone(),
            self.human.clone(),
            self.automated.clone(),
            self.follow_up.clone(),
        ]
        .into_iter()
        .chain(Domain::ALL.iter().map(|d| self.domain_label(*d)));

        for label in candidates {
            if !label.is_empty() && !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }
}

//! Classification result types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a message was written by a person or generated by a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Human,
    Automated,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Human => "human",
            MessageKind::Automated => "automated",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(MessageKind::Human),
            "automated" => Ok(MessageKind::Automated),
            other => Err(format!("unknown message kind '{other}'")),
        }
    }
}

/// Life-domain category of an automated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Finance,
    Shopping,
    Travel,
    Health,
    Government,
    Work,
    Education,
    Newsletter,
    Marketing,
    Social,
    Alerts,
    Other,
}

impl Domain {
    /// Every domain, in label-creation order.
    pub const ALL: [Domain; 12] = [
        Domain::Finance,
        Domain::Shopping,
        Domain::Travel,
        Domain::Health,
        Domain::Government,
        Domain::Work,
        Domain::Education,
        Domain::Newsletter,
        Domain::Marketing,
        Domain::Social,
        Domain::Alerts,
        Domain::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Finance => "finance",
            Domain::Shopping => "shopping",
            Domain::Travel => "travel",
            Domain::Health => "health",
            Domain::Government => "government",
            Domain::Work => "work",
            Domain::Education => "education",
            Domain::Newsletter => "newsletter",
            Domain::Marketing => "marketing",
            Domain::Social => "social",
            Domain::Alerts => "alerts",
            Domain::Other => "other",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown domain '{s}'"))
    }
}

/// Structured analysis of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub message_id: String,
    pub kind: MessageKind,
    /// Set for automated messages only.
    pub domain: Option<Domain>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub requires_reply: bool,
    /// Free-text deadline description, if one was mentioned.
    #[serde(default)]
    pub deadline: Option<String>,
}

impl Classification {
    /// The deadline text, treating blank strings as absent.
    pub fn deadline_text(&self) -> Option<&str> {
        self.deadline.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }
}

//! Classifier backed by the Anthropic Messages API.
//!
//! Uses a single tool with a forced `tool_choice`, so the model always
//! answers with machine-readable input for `record_email_analysis`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::classifier::{ClassifyError, Classifier};
use super::prompt::build_user_content;
use super::types::{Classification, Domain, MessageKind};
use crate::config::ClassifierConfig;
use crate::email::RawMessage;

const API_VERSION: &str = "2023-06-01";

/// Name of the forced analysis tool.
pub const ANALYSIS_TOOL_NAME: &str = "record_email_analysis";

/// JSON schema of the analysis tool input.
pub fn analysis_tool() -> Value {
    let domains: Vec<Value> = Domain::ALL
        .iter()
        .map(|d| Value::from(d.as_str()))
        .chain(std::iter::once(Value::Null))
        .collect();

    json!({
        "name": ANALYSIS_TOOL_NAME,
        "description": "Record structured analysis of an email.",
        "input_schema": {
            "type": "object",
            "properties": {
                "email_type": {
                    "type": "string",
                    "enum": ["human", "automated"],
                    "description": "'human' if written by a real person; 'automated' if system-generated."
                },
                "domain": {
                    "type": ["string", "null"],
                    "enum": domains,
                    "description": "Category for automated emails only; null for human emails."
                },
                "entities": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Named people, organisations, products, or key topics."
                },
                "summary": {
                    "type": "string",
                    "description": "One sentence summary of the email."
                },
                "requires_reply": {
                    "type": "boolean",
                    "description": "True if the sender expects a reply."
                },
                "deadline": {
                    "type": ["string", "null"],
                    "description": "Any deadline or time constraint mentioned; null if none."
                }
            },
            "required": ["email_type", "domain", "entities", "summary", "requires_reply", "deadline"]
        }
    })
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    ToolUse {
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

/// Raw tool input as the model produces it.
#[derive(Deserialize)]
struct AnalysisInput {
    email_type: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    entities: Vec<Value>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    requires_reply: bool,
    #[serde(default)]
    deadline: Option<String>,
}

/// Classifier calling `{base_url}/v1/messages`.
pub struct AnthropicClassifier {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClassifier {
    pub fn new(config: &ClassifierConfig, api_key: SecretString) -> Result<Self, ClassifyError> {
        if api_key.expose_secret().is_empty() {
            return Err(ClassifyError::Config("API key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Classifier for AnthropicClassifier {
    async fn classify(&self, message: &RawMessage) -> Result<Classification, ClassifyError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "tools": [analysis_tool()],
            "tool_choice": {"type": "tool", "name": ANALYSIS_TOOL_NAME},
            "messages": [{"role": "user", "content": build_user_content(message)}],
        });

        debug!(message_id = %message.id, model = %self.model, "classifying message");
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let api_response: ApiResponse = response.json().await?;
        let input = api_response
            .content
            .into_iter()
            .find_map(|block| match block {
                ResponseBlock::ToolUse { name, input } if name == ANALYSIS_TOOL_NAME => Some(input),
                _ => None,
            })
            .ok_or_else(|| ClassifyError::MissingToolCall {
                message_id: message.id.clone(),
                stop_reason: api_response
                    .stop_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".into()),
            })?;

        parse_analysis(&message.id, input)
    }
}

/// Converts the tool input into a typed [`Classification`].
pub fn parse_analysis(message_id: &str, input: Value) -> Result<Classification, ClassifyError> {
    let malformed = |reason: String| ClassifyError::Malformed {
        message_id: message_id.to_string(),
        reason,
    };

    let raw: AnalysisInput =
        serde_json::from_value(input).map_err(|e| malformed(e.to_string()))?;

    let kind: MessageKind = raw.email_type.parse().map_err(malformed)?;
    let domain = match raw.domain.as_deref() {
        None | Some("") => None,
        Some(d) => Some(d.parse::<Domain>().map_err(malformed)?),
    };

    Ok(Classification {
        message_id: message_id.to_string(),
        kind,
        domain,
        entities: raw
            .entities
            .into_iter()
            .map(|e| match e {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        summary: raw.summary.unwrap_or_default(),
        requires_reply: raw.requires_reply,
        deadline: raw.deadline.filter(|d| !d.trim().is_empty()),
    })
}

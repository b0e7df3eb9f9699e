//! Gmail gateway backed by the Google Workspace MCP server.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{GatewayError, Result};
use super::gateway::{GatewayConnector, MailboxGateway};
use super::mcp::{McpSession, StdioTransport, ToolOutput};
use super::message::RawMessage;
use super::parser;
use crate::config::GatewayConfig;

/// Gmail system label id for starred messages.
const STARRED: &str = "STARRED";

const UNREAD_QUERY: &str = "is:unread";

/// Mailbox gateway over one initialized MCP session.
///
/// Keeps a private label name → id cache. It is filled on connect,
/// refreshed on lookup misses, and refreshed after every label it creates.
pub struct GmailGateway {
    session: McpSession,
    user_email: String,
    label_cache: Mutex<HashMap<String, String>>,
}

impl GmailGateway {
    /// Wraps an initialized session and warms the label cache.
    pub async fn new(session: McpSession, user_email: impl Into<String>) -> Result<Self> {
        let gateway = Self {
            session,
            user_email: user_email.into(),
            label_cache: Mutex::new(HashMap::new()),
        };
        gateway.refresh_label_cache().await?;
        Ok(gateway)
    }

    async fn call(&self, tool: &str, mut arguments: serde_json::Value) -> Result<ToolOutput> {
        if let Some(args) = arguments.as_object_mut() {
            args.insert("user_google_email".into(), json!(self.user_email));
        }
        self.session.call_tool(tool, arguments).await
    }

    async fn search_ids(&self, query: &str, max: usize) -> Result<Vec<String>> {
        let output = self
            .call(
                "search_gmail_messages",
                json!({ "query": query, "page_size": max }),
            )
            .await?;
        Ok(parser::parse_search_ids(&output))
    }

    async fn fetch_batch(&self, ids: Vec<String>) -> Result<Vec<RawMessage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let output = self
            .call(
                "get_gmail_messages_content_batch",
                json!({ "message_ids": ids }),
            )
            .await?;
        Ok(parser::parse_messages(&output))
    }

    async fn refresh_label_cache(&self) -> Result<()> {
        let output = self.call("list_gmail_labels", json!({})).await?;
        if let Some(labels) = parser::parse_labels(&output) {
            debug!(count = labels.len(), "label cache refreshed");
            *self.label_cache.lock().await = labels;
        }
        Ok(())
    }

    async fn cached_label_id(&self, name: &str) -> Option<String> {
        self.label_cache.lock().await.get(name).cloned()
    }

    /// Returns the label id, refreshing the cache once on a miss.
    async fn lookup_label_id(&self, name: &str) -> Result<Option<String>> {
        if let Some(id) = self.cached_label_id(name).await {
            return Ok(Some(id));
        }
        self.refresh_label_cache().await?;
        Ok(self.cached_label_id(name).await)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        if let Some(id) = self.cached_label_id(name).await {
            return Ok(id);
        }
        self.call(
            "manage_gmail_label",
            json!({ "name": name, "action": "create" }),
        )
        .await?;
        self.refresh_label_cache().await?;

        let id = self.cached_label_id(name).await.ok_or_else(|| {
            GatewayError::InvalidResponse(format!(
                "label '{name}' was created but is missing from the label list"
            ))
        })?;
        info!(label = name, id = %id, "created mailbox label");
        Ok(id)
    }

    async fn modify_labels(&self, id: &str, add: &[&str], remove: &[&str]) -> Result<()> {
        let mut args = json!({ "message_id": id });
        if !add.is_empty() {
            args["add_label_ids"] = json!(add);
        }
        if !remove.is_empty() {
            args["remove_label_ids"] = json!(remove);
        }
        self.call("modify_gmail_message_labels", args).await?;
        Ok(())
    }
}

#[async_trait]
impl MailboxGateway for GmailGateway {
    async fn list_unread_ids(&self, max: usize) -> Result<Vec<String>> {
        self.search_ids(UNREAD_QUERY, max).await
    }

    async fn list_unread_messages(&self, max: usize) -> Result<Vec<RawMessage>> {
        let ids = self.search_ids(UNREAD_QUERY, max).await?;
        self.fetch_batch(ids).await
    }

    async fn list_messages_since(&self, days: u32, max: usize) -> Result<Vec<RawMessage>> {
        let ids = self.search_ids(&since_query(days), max).await?;
        self.fetch_batch(ids).await
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage> {
        let output = self
            .call("get_gmail_message_content", json!({ "message_id": id }))
            .await?;
        parser::parse_messages(&output)
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    async fn apply_label(&self, id: &str, label: &str) -> Result<()> {
        let label_id = match self.lookup_label_id(label).await? {
            Some(label_id) => label_id,
            None => self.create_label(label).await?,
        };
        self.modify_labels(id, &[label_id.as_str()], &[]).await?;
        debug!(message_id = id, label, "applied label");
        Ok(())
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<()> {
        let Some(label_id) = self.lookup_label_id(label).await? else {
            warn!(label, "label not found in mailbox, skipping remove");
            return Ok(());
        };
        self.modify_labels(id, &[], &[label_id.as_str()]).await?;
        debug!(message_id = id, label, "removed label");
        Ok(())
    }

    async fn star(&self, id: &str) -> Result<()> {
        self.modify_labels(id, &[STARRED], &[]).await?;
        debug!(message_id = id, "starred message");
        Ok(())
    }

    async fn ensure_labels(&self, names: &[String]) -> Result<()> {
        self.refresh_label_cache().await?;
        for name in names {
            if self.cached_label_id(name).await.is_some() {
                debug!(label = %name, "label already exists");
                continue;
            }
            self.create_label(name).await?;
        }
        Ok(())
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.call(
            "send_gmail_message",
            json!({ "to": to, "subject": subject, "body": body }),
        )
        .await?;
        info!(to, subject, "sent message");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await
    }
}

/// Search query for messages received within the last `days` days.
pub fn since_query(days: u32) -> String {
    let since = Local::now() - ChronoDuration::days(i64::from(days));
    format!("after:{}", since.format("%Y/%m/%d"))
}

/// Spawns a fresh MCP server process and session per connect.
pub struct McpGatewayConnector {
    config: GatewayConfig,
}

impl McpGatewayConnector {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        if config.user_email.trim().is_empty() {
            return Err(GatewayError::Config(
                "user_email must be set (or USER_GOOGLE_EMAIL)".into(),
            ));
        }
        Ok(Self { config })
    }

    /// Arguments for the server command. `uvx` launches the workspace
    /// server with the gmail tool set unless args are configured.
    fn server_args(&self) -> Vec<String> {
        if !self.config.args.is_empty() {
            return self.config.args.clone();
        }
        let basename = Path::new(&self.config.command)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if basename == "uvx" {
            vec!["workspace-mcp".into(), "--tools".into(), "gmail".into()]
        } else {
            Vec::new()
        }
    }

    fn server_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for key in ["GOOGLE_OAUTH_CLIENT_ID", "GOOGLE_OAUTH_CLIENT_SECRET"] {
            env.insert(key.to_string(), std::env::var(key).unwrap_or_default());
        }
        env.insert("USER_GOOGLE_EMAIL".into(), self.config.user_email.clone());
        env.insert("MCP_SINGLE_USER_MODE".into(), "1".into());
        env.insert("WORKSPACE_MCP_PORT".into(), self.config.port.to_string());
        env.insert("PYTHONUTF8".into(), "1".into());
        env.extend(self.config.env.clone());
        env
    }
}

#[async_trait]
impl GatewayConnector for McpGatewayConnector {
    async fn connect(&self) -> Result<Arc<dyn MailboxGateway>> {
        let transport = StdioTransport::spawn(
            &self.config.command,
            &self.server_args(),
            &self.server_env(),
            Duration::from_secs(self.config.request_timeout_secs),
        )?;
        let session = McpSession::connect(Box::new(transport)).await?;
        let gateway = GmailGateway::new(session, self.config.user_email.clone()).await?;
        info!(account = %self.config.user_email, "mailbox gateway connected");
        Ok(Arc::new(gateway))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::mcp::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
    use crate::email::mcp::McpTransport;
    use serde_json::Value;
    use std::sync::Mutex as StdMutex;

    /// Fake workspace server: answers tool calls from an in-memory mailbox.
    #[derive(Default)]
    struct FakeServer {
        labels: StdMutex<Vec<(String, String)>>,
        calls: Arc<StdMutex<Vec<(String, Value)>>>,
    }

    impl FakeServer {
        fn text(text: String) -> Value {
            json!({ "content": [{ "type": "text", "text": text }] })
        }

        fn handle_tool(&self, name: &str, args: &Value) -> Value {
            match name {
                "list_gmail_labels" => {
                    let labels = self.labels.lock().unwrap();
                    let lines: Vec<String> = labels
                        .iter()
                        .map(|(name, id)| format!("  • {name} (ID: {id})"))
                        .collect();
                    Self::text(format!("Labels:\n{}", lines.join("\n")))
                }
                "manage_gmail_label" => {
                    let mut labels = self.labels.lock().unwrap();
                    let id = format!("Label_{}", labels.len() + 1);
                    let name = args["name"].as_str().unwrap_or_default().to_string();
                    labels.push((name, id));
                    Self::text("Label created".into())
                }
                "search_gmail_messages" => Self::text(
                    "Message ID: m1\nThread ID: t1\n\nMessage ID: m2\nThread ID: t2\n".into(),
                ),
                "get_gmail_messages_content_batch" | "get_gmail_message_content" => {
                    Self::text("Message ID: m1\nSubject: Hi\nFrom: a@example.com\n\nBody".into())
                }
                _ => Self::text("ok".into()),
            }
        }
    }

    #[async_trait]
    impl McpTransport for FakeServer {
        async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
            let result = if request.method == "initialize" {
                json!({ "serverInfo": { "name": "fake", "version": "0" } })
            } else {
                let name = request.params["name"].as_str().unwrap_or_default().to_string();
                let args = request.params["arguments"].clone();
                self.calls.lock().unwrap().push((name.clone(), args.clone()));
                self.handle_tool(&name, &args)
            };
            Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: request.id,
                result: Some(result),
                error: None,
            })
        }

        async fn send_notification(&self, _notification: JsonRpcNotification) -> Result<()> {
            Ok(())
        }
    }

    async fn gateway_with(
        labels: &[(&str, &str)],
    ) -> (GmailGateway, Arc<StdMutex<Vec<(String, Value)>>>) {
        let server = FakeServer::default();
        *server.labels.lock().unwrap() = labels
            .iter()
            .map(|(n, i)| (n.to_string(), i.to_string()))
            .collect();
        let calls = Arc::clone(&server.calls);
        let session = McpSession::connect(Box::new(server)).await.unwrap();
        let gateway = GmailGateway::new(session, "me@example.com").await.unwrap();
        (gateway, calls)
    }

    fn tool_calls(calls: &StdMutex<Vec<(String, Value)>>, tool: &str) -> Vec<Value> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, args)| args.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_apply_label_creates_missing_label() {
        let (gateway, calls) = gateway_with(&[("INBOX", "INBOX")]).await;

        gateway.apply_label("m1", "AI/Human").await.unwrap();
        gateway.apply_label("m2", "AI/Human").await.unwrap();

        assert_eq!(tool_calls(&calls, "manage_gmail_label").len(), 1);
        let modifies = tool_calls(&calls, "modify_gmail_message_labels");
        assert_eq!(modifies.len(), 2);
        assert_eq!(modifies[0]["add_label_ids"], json!(["Label_2"]));
        assert_eq!(modifies[0]["user_google_email"], "me@example.com");
    }

    #[tokio::test]
    async fn test_remove_unknown_label_is_noop() {
        let (gateway, calls) = gateway_with(&[]).await;
        gateway.remove_label("m1", "AI/Missing").await.unwrap();
        assert!(tool_calls(&calls, "modify_gmail_message_labels").is_empty());
    }

    #[tokio::test]
    async fn test_star_uses_system_label() {
        let (gateway, calls) = gateway_with(&[]).await;
        gateway.star("m1").await.unwrap();
        let modifies = tool_calls(&calls, "modify_gmail_message_labels");
        assert_eq!(modifies[0]["add_label_ids"], json!([STARRED]));
    }

    #[tokio::test]
    async fn test_ensure_labels_only_creates_missing() {
        let (gateway, calls) = gateway_with(&[("AI", "Label_1")]).await;
        let names = vec!["AI".to_string(), "AI/Human".to_string(), "AI/Human".to_string()];
        gateway.ensure_labels(&names).await.unwrap();

        let created = tool_calls(&calls, "manage_gmail_label");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["name"], "AI/Human");
    }

    #[tokio::test]
    async fn test_list_unread_messages_fetches_batch() {
        let (gateway, calls) = gateway_with(&[]).await;
        let messages = gateway.list_unread_messages(50).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "Hi");

        let batch = tool_calls(&calls, "get_gmail_messages_content_batch");
        assert_eq!(batch[0]["message_ids"], json!(["m1", "m2"]));
        let search = tool_calls(&calls, "search_gmail_messages");
        assert_eq!(search[0]["query"], UNREAD_QUERY);
        assert_eq!(search[0]["page_size"], 50);
    }

    #[test]
    fn test_since_query_format() {
        let query = since_query(7);
        assert!(query.starts_with("after:"));
        assert_eq!(query.len(), "after:2026/01/01".len());
    }

    #[test]
    fn test_connector_requires_account() {
        let config = GatewayConfig {
            user_email: String::new(),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            McpGatewayConnector::new(config),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_uvx_gets_workspace_args() {
        let config = GatewayConfig {
            command: "/usr/local/bin/uvx".into(),
            user_email: "me@example.com".into(),
            ..GatewayConfig::default()
        };
        let connector = McpGatewayConnector::new(config).unwrap();
        assert_eq!(connector.server_args(), vec!["workspace-mcp", "--tools", "gmail"]);
        assert_eq!(
            connector.server_env().get("MCP_SINGLE_USER_MODE").map(String::as_str),
            Some("1")
        );
    }
}

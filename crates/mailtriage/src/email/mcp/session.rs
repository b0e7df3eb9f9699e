//! Initialized MCP session over a transport.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::transport::McpTransport;
use super::types::{JsonRpcNotification, JsonRpcRequest, ToolCallResult, ToolOutput};
use crate::email::error::{GatewayError, Result};

/// Protocol version sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const CLIENT_NAME: &str = "mailtriage";

/// Server identification returned by `initialize`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A session that has completed the initialize handshake.
pub struct McpSession {
    transport: Box<dyn McpTransport>,
    request_id: AtomicU64,
    pub server_info: ServerInfo,
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("server_info", &self.server_info)
            .finish_non_exhaustive()
    }
}

impl McpSession {
    /// Performs the `initialize` / `notifications/initialized` handshake.
    pub async fn connect(transport: Box<dyn McpTransport>) -> Result<Self> {
        let mut session = Self {
            transport,
            request_id: AtomicU64::new(1),
            server_info: ServerInfo::default(),
        };

        let result = session
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": CLIENT_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;

        if let Some(info) = result.get("serverInfo") {
            session.server_info = serde_json::from_value(info.clone()).unwrap_or_default();
        }

        session
            .transport
            .send_notification(JsonRpcNotification::new(
                "notifications/initialized",
                json!({}),
            ))
            .await?;

        info!(
            server = %session.server_info.name,
            version = %session.server_info.version,
            "gateway session initialized"
        );
        Ok(session)
    }

    /// Calls a tool and decodes its first text block.
    ///
    /// A result flagged `isError` becomes [`GatewayError::Tool`].
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        debug!(tool = name, "calling gateway tool");
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        let result: ToolCallResult = serde_json::from_value(result)?;
        if result.is_error {
            return Err(GatewayError::Tool {
                tool: name.to_string(),
                message: result.joined_text(),
            });
        }
        Ok(ToolOutput::from_result(&result))
    }

    /// Closes the underlying transport.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .transport
            .send_request(JsonRpcRequest::new(id, method, params))
            .await?;

        if let Some(err) = response.error {
            return Err(GatewayError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| GatewayError::InvalidResponse(format!("empty result for {method}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::mcp::types::{JsonRpcError, JsonRpcResponse};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Replies to each request with the next scripted response.
    struct ScriptedTransport {
        responses: Mutex<Vec<JsonRpcResponse>>,
        requests: Arc<Mutex<Vec<JsonRpcRequest>>>,
        notifications: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedTransport {
        fn new(mut responses: Vec<JsonRpcResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Arc::new(Mutex::new(Vec::new())),
                notifications: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl McpTransport for ScriptedTransport {
        async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
            let id = request.id;
            self.requests.lock().unwrap().push(request);
            let mut response = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| GatewayError::Transport("script exhausted".into()))?;
            response.id = id;
            Ok(response)
        }

        async fn send_notification(&self, notification: JsonRpcNotification) -> Result<()> {
            self.notifications
                .lock()
                .unwrap()
                .push(notification.method);
            Ok(())
        }
    }

    fn ok(result: Value) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 0,
            result: Some(result),
            error: None,
        }
    }

    fn init_response() -> JsonRpcResponse {
        ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "workspace-mcp", "version": "1.2.0"}
        }))
    }

    #[tokio::test]
    async fn test_connect_performs_handshake() {
        let transport = ScriptedTransport::new(vec![init_response()]);
        let requests = Arc::clone(&transport.requests);
        let notifications = Arc::clone(&transport.notifications);

        let session = McpSession::connect(Box::new(transport)).await.unwrap();
        assert_eq!(session.server_info.name, "workspace-mcp");

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].method, "initialize");
        assert_eq!(requests[0].params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(
            notifications.lock().unwrap().as_slice(),
            ["notifications/initialized"]
        );
    }

    #[tokio::test]
    async fn test_call_tool_decodes_text_output() {
        let transport = ScriptedTransport::new(vec![
            init_response(),
            ok(json!({"content": [{"type": "text", "text": "Label created"}]})),
        ]);
        let requests = Arc::clone(&transport.requests);
        let session = McpSession::connect(Box::new(transport)).await.unwrap();

        let output = session
            .call_tool("manage_gmail_label", json!({"action": "create"}))
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::Text("Label created".into()));

        let requests = requests.lock().unwrap();
        assert_eq!(requests[1].method, "tools/call");
        assert_eq!(requests[1].params["name"], "manage_gmail_label");
        assert_ne!(requests[0].id, requests[1].id);
    }

    #[tokio::test]
    async fn test_call_tool_error_result() {
        let transport = ScriptedTransport::new(vec![
            init_response(),
            ok(json!({
                "content": [{"type": "text", "text": "quota exceeded"}],
                "isError": true
            })),
        ]);
        let session = McpSession::connect(Box::new(transport)).await.unwrap();

        let err = session
            .call_tool("search_gmail_messages", json!({}))
            .await
            .unwrap_err();
        match err {
            GatewayError::Tool { tool, message } => {
                assert_eq!(tool, "search_gmail_messages");
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_protocol_error_during_initialize() {
        let transport = ScriptedTransport::new(vec![JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 0,
            result: None,
            error: Some(JsonRpcError {
                code: -32600,
                message: "bad request".into(),
                data: None,
            }),
        }]);

        let err = McpSession::connect(Box::new(transport)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol { code: -32600, .. }));
    }
}

//! Stdio transport for the gateway server process.
//!
//! Spawns the server as a child process and exchanges newline-delimited
//! JSON-RPC messages over its stdin/stdout. A background reader task
//! routes responses to waiting callers by request id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::email::error::{GatewayError, Result};

/// Transport layer for JSON-RPC communication with the gateway server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Sends a request and waits for its response.
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Sends a notification; no response is expected.
    async fn send_notification(&self, notification: JsonRpcNotification) -> Result<()>;

    /// Releases the underlying resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Transport over a child process's stdin/stdout.
///
/// The child is killed when the transport is closed or dropped.
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    /// Set once the reader has stopped; no response can arrive after that.
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    request_timeout: Duration,
}

impl StdioTransport {
    /// Spawns `command` and starts the response reader.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| GatewayError::Spawn {
            command: command.to_string(),
            source: e,
        })?;
        info!(command, pid = child.id(), "gateway server process started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::Transport("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Transport("failed to capture stdout".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);
        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = Arc::clone(&closed);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(response) => {
                                let id = response.id;
                                let mut map = reader_pending.lock().await;
                                if let Some(tx) = map.remove(&id) {
                                    let _ = tx.send(response);
                                } else {
                                    warn!(id, "response with no pending request");
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, "ignoring non-response line from gateway");
                            }
                        }
                    }
                    Ok(None) => {
                        warn!("gateway server closed stdout");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "gateway stdout read error");
                        break;
                    }
                }
            }

            // Mark closed before clearing so a request registered after the
            // clear still sees the flag.
            reader_closed.store(true, Ordering::SeqCst);
            // Dropping the senders wakes every waiting caller with an error.
            reader_pending.lock().await.clear();
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            closed,
            reader,
            request_timeout,
        })
    }

    /// True once the server's stdout has closed or failed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn closed_error() -> GatewayError {
        GatewayError::Transport("gateway server closed stdout".into())
    }

    async fn write_line(&self, line: String) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to write to stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to flush stdin: {e}")))
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let id = request.id;
        debug!(method = %request.method, id, "gateway request");

        if self.is_closed() {
            return Err(Self::closed_error());
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        if self.is_closed() {
            self.pending.lock().await.remove(&id);
            return Err(Self::closed_error());
        }

        if let Err(e) = self.write_line(line).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(GatewayError::Transport(
                "gateway server closed stdout before responding".into(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(GatewayError::Timeout(format!(
                    "request {} ({}) after {}s",
                    id,
                    request.method,
                    self.request_timeout.as_secs()
                )))
            }
        }
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> Result<()> {
        let mut line = serde_json::to_string(&notification)?;
        line.push('\n');
        debug!(method = %notification.method, "gateway notification");
        self.write_line(line).await
    }

    async fn close(&self) -> Result<()> {
        self.reader.abort();
        let mut child = self.child.lock().await;
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(%status, "gateway server already exited");
                Ok(())
            }
            _ => child
                .kill()
                .await
                .map_err(|e| GatewayError::Transport(format!("failed to stop server: {e}"))),
        }
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

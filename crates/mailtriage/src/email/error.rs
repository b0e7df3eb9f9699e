//! Mailbox gateway error types.

use thiserror::Error;

/// Errors raised by the mailbox gateway.
///
/// Every variant is treated as connection-level by the watcher: it ends
/// the current session and triggers reconnect with backoff.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Failed to spawn the gateway server process.
    #[error("Failed to spawn gateway server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The stdio transport failed (closed pipe, write failure).
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// The server answered with a JSON-RPC error.
    #[error("Gateway protocol error {code}: {message}")]
    Protocol { code: i32, message: String },

    /// A tool call completed but reported an error result.
    #[error("Tool '{tool}' returned error: {message}")]
    Tool { tool: String, message: String },

    /// The response could not be interpreted.
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),

    /// Requested message does not exist.
    #[error("Message '{0}' not found")]
    NotFound(String),

    /// A request did not complete within the configured timeout.
    #[error("Gateway request timed out: {0}")]
    Timeout(String),

    /// Invalid gateway configuration.
    #[error("Invalid gateway configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

//! Mailbox access.
//!
//! The core only sees the [`MailboxGateway`] capability trait. The Gmail
//! implementation talks to the Google Workspace MCP server over stdio.

pub mod error;
pub mod gateway;
pub mod gmail;
pub mod mcp;
pub mod message;
pub mod parser;

pub use error::GatewayError;
pub use gateway::{GatewayConnector, MailboxGateway, DEFAULT_POLL_BATCH, DEFAULT_SEED_BATCH};
pub use gmail::{GmailGateway, McpGatewayConnector};
pub use message::RawMessage;

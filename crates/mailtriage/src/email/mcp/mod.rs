//! Model Context Protocol client used to reach the mailbox server.
//!
//! JSON-RPC 2.0 over a child process's stdio.

pub mod session;
pub mod transport;
pub mod types;

pub use session::McpSession;
pub use transport::{McpTransport, StdioTransport};
pub use types::ToolOutput;

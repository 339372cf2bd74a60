//! # MCP client role
//!
//! [`McpClient`] drives the initialization handshake, checks the server's
//! advertised capabilities before every typed call, answers server-initiated
//! sampling and elicitation requests through host-supplied callbacks, and
//! exposes task-augmented tool calls as a polled update stream.
//!
//! Transports: any [`galah_mcp_peer::Transport`]; this crate ships the
//! Streamable HTTP one ([`transport::StreamableHttpTransport`]).

pub mod client;
pub mod streaming;
pub mod transport;

pub use client::{McpClient, McpClientBuilder};
pub use streaming::ToolCallUpdate;
pub use transport::StreamableHttpTransport;

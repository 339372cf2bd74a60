//! # MCP server role
//!
//! [`McpServer`] layers registries of tools, resources, resource templates,
//! and prompts over a symmetric [`galah_mcp_peer::Peer`], installs the
//! server half of the initialization handshake, and turns task-augmented
//! `tools/call` requests into observable tasks that can elicit input and
//! request sampling from the client while they run.
//!
//! Each server instance owns its own task store and queue; nothing leaks
//! across sessions.

pub mod context;
mod handlers;
pub mod server;
pub mod tasks;
pub mod uri_template;

pub use context::ToolContext;
pub use server::{McpServer, McpServerBuilder};
pub use tasks::TaskSession;
pub use uri_template::UriTemplate;

//! # Streamable HTTP transport (server side)
//!
//! One endpoint, three verbs. POST carries a single JSON-RPC message and is
//! answered with JSON, a per-request SSE stream, or `202 Accepted`. GET
//! opens the session's standalone server→client stream, resumable with
//! `Last-Event-ID` when an [`EventStore`] is configured. DELETE tears the
//! session down.
//!
//! Each session owns one `McpServer` (minted by the host-supplied factory)
//! wired to a [`session::SessionTransport`] that routes outbound messages
//! by request ID: responses and request-scoped notifications go to the
//! originating per-request stream, everything else to the standalone
//! stream, with the event store as the buffer of last resort.

pub mod config;
pub mod event_store;
pub mod handler;
pub mod server;
pub mod session;

pub use config::{Authenticator, DnsRebindingConfig, HttpServerConfig};
pub use event_store::{EventStore, InMemoryEventStore};
pub use handler::StreamableHttpService;
pub use server::{HttpServerError, McpHttpServer};

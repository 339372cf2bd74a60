//! # Symmetric MCP peer
//!
//! One protocol core used by both roles. A [`Peer`] owns a [`Transport`] for
//! its lifetime, correlates outbound requests to inbound responses,
//! dispatches inbound requests to registered handlers without blocking the
//! receive loop, and handles the two universal notifications
//! (`notifications/cancelled`, `notifications/progress`) internally.
//!
//! Client and server are thin adapters over this crate: they install
//! different handlers and issue different requests on the same pipe.

pub mod capabilities;
pub mod context;
pub mod inprocess;
pub mod peer;
pub mod transport;

pub use capabilities::{assert_client_capability, assert_server_capability};
pub use context::RequestContext;
pub use peer::{Peer, RequestOptions, DEFAULT_REQUEST_TIMEOUT};
pub use transport::{Transport, TransportError, TransportEvent, TransportSendOptions};

pub use inprocess::InProcessTransport;

//! The abstract message pipe a peer speaks through.
//!
//! A transport delivers already-decoded JSON-RPC messages; framing, HTTP
//! sessions, and reconnection live behind this trait. Events flow to the
//! peer through the receiver returned by [`Transport::start`], which keeps
//! message delivery single-threaded per protocol instance.

use async_trait::async_trait;
use tokio::sync::mpsc;

use galah_mcp_protocol::{JsonRpcMessage, RequestId};

/// Transport-level failures. Informational unless the transport closes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport not started")]
    NotStarted,

    #[error("i/o failure: {0}")]
    Io(String),

    #[error("HTTP failure: {0}")]
    Http(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// What a transport delivers to its peer.
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded inbound message
    Message(JsonRpcMessage),
    /// A recoverable fault; the pipe is still usable
    Error(TransportError),
    /// The pipe is gone; no further events follow
    Closed,
}

/// Per-send context a transport may use for routing.
#[derive(Debug, Clone, Default)]
pub struct TransportSendOptions {
    /// The inbound request this message was produced while handling. The
    /// HTTP server transport uses it to keep causally related messages on
    /// the originating per-request stream.
    pub related_request_id: Option<RequestId>,
    /// Resume marker (`Last-Event-ID`) for transports that replay.
    pub resumption_token: Option<String>,
}

impl TransportSendOptions {
    pub fn related_to(request_id: RequestId) -> Self {
        Self {
            related_request_id: Some(request_id),
            ..Default::default()
        }
    }
}

/// A bidirectional message pipe.
///
/// `start` may be called once; it hands back the inbound event stream.
/// `send` frames and writes one complete message atomically with respect to
/// other `send` calls. `close` is idempotent and terminates the event
/// stream with [`TransportEvent::Closed`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    async fn send(
        &self,
        message: JsonRpcMessage,
        options: TransportSendOptions,
    ) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    /// Server-assigned session identifier, once known.
    fn session_id(&self) -> Option<String> {
        None
    }

    /// Open the server→client standalone stream, for transports that have
    /// one. Called by the client after initialization succeeds.
    async fn open_standalone_stream(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

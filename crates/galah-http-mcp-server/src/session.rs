//! Per-session state: the server-side transport and its stream routing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use galah_mcp_peer::{Transport, TransportError, TransportEvent, TransportSendOptions};
use galah_mcp_protocol::{JsonRpcMessage, RequestId};
use galah_mcp_server::McpServer;

use crate::event_store::EventStore;

const INBOUND_CAPACITY: usize = 256;
const STREAM_CAPACITY: usize = 64;

/// One SSE event queued for a response body.
pub(crate) struct SseFrame {
    pub event_id: String,
    pub message: JsonRpcMessage,
}

impl SseFrame {
    /// Wire format: an `id:` line and one `data:` line per payload line.
    pub fn format(&self) -> String {
        let data = serde_json::to_string(&self.message).unwrap_or_else(|_| "{}".to_string());
        let mut out = format!("id: {}\n", self.event_id);
        for line in data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Where the answer to one client request should be written.
pub(crate) enum ResponseSink {
    /// Buffered JSON response for clients that did not accept SSE
    Json(oneshot::Sender<JsonRpcMessage>),
    /// Per-request SSE stream
    Sse {
        frames: mpsc::Sender<SseFrame>,
        stream_id: String,
    },
}

/// Outbound routing state for one session.
///
/// All outbound writes serialize through `write_lock`, which also lets the
/// standalone GET handler install its sender and finish replay before any
/// live event is appended.
pub(crate) struct SessionStreams {
    session_id: String,
    standalone_stream_id: String,
    request_streams: parking_lot::Mutex<HashMap<RequestId, ResponseSink>>,
    standalone: parking_lot::Mutex<Option<mpsc::Sender<SseFrame>>>,
    event_store: Option<Arc<dyn EventStore>>,
    /// Used for `id:` lines when no event store is configured
    fallback_counter: AtomicU64,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SessionStreams {
    fn new(session_id: String, event_store: Option<Arc<dyn EventStore>>) -> Self {
        let standalone_stream_id = format!("{}-standalone", session_id);
        Self {
            session_id,
            standalone_stream_id,
            request_streams: parking_lot::Mutex::new(HashMap::new()),
            standalone: parking_lot::Mutex::new(None),
            event_store,
            fallback_counter: AtomicU64::new(0),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn register_json(&self, request_id: RequestId, sender: oneshot::Sender<JsonRpcMessage>) {
        self.request_streams
            .lock()
            .insert(request_id, ResponseSink::Json(sender));
    }

    /// Open a per-request SSE stream; returns the body's frame receiver.
    pub fn register_sse(&self, request_id: RequestId) -> mpsc::Receiver<SseFrame> {
        let (frames, receiver) = mpsc::channel(STREAM_CAPACITY);
        let stream_id = format!("{}-req-{}", self.session_id, request_id);
        self.request_streams
            .lock()
            .insert(request_id, ResponseSink::Sse { frames, stream_id });
        receiver
    }

    /// Install the standalone stream sender; fails when one is already
    /// live. Caller must hold the write lock while replaying.
    pub fn set_standalone(&self, sender: mpsc::Sender<SseFrame>) -> bool {
        let mut slot = self.standalone.lock();
        if let Some(existing) = slot.as_ref()
            && !existing.is_closed()
        {
            return false;
        }
        *slot = Some(sender);
        true
    }

    pub async fn write_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Movable guard for work that outlives the caller (replay tasks).
    pub async fn write_guard_owned(&self) -> tokio::sync::OwnedMutexGuard<()> {
        self.write_lock.clone().lock_owned().await
    }

    async fn assign_event_id(&self, stream_id: &str, message: &JsonRpcMessage) -> String {
        if let Some(store) = &self.event_store {
            match store.store_event(stream_id, message).await {
                Ok(event_id) => return event_id,
                Err(e) => warn!(error = %e, "event store write failed; using volatile id"),
            }
        }
        format!(
            "{}_{}",
            stream_id,
            self.fallback_counter.fetch_add(1, Ordering::SeqCst) + 1
        )
    }

    /// Route one outbound message per the ordering rules: a response goes
    /// to its request's sink; a request-scoped message to the originating
    /// per-request stream; anything else to the standalone stream, with
    /// the event store buffering when no stream is open.
    pub async fn route(
        &self,
        message: JsonRpcMessage,
        options: TransportSendOptions,
    ) -> Result<(), TransportError> {
        let _guard = self.write_guard().await;

        if let JsonRpcMessage::Response(response) = &message {
            let sink = self.request_streams.lock().remove(&response.id);
            match sink {
                Some(ResponseSink::Json(sender)) => {
                    let _ = sender.send(message);
                    return Ok(());
                }
                Some(ResponseSink::Sse { frames, stream_id }) => {
                    let event_id = self.assign_event_id(&stream_id, &message).await;
                    let _ = frames.send(SseFrame { event_id, message }).await;
                    // Dropping `frames` ends the body after this final event.
                    return Ok(());
                }
                None => {}
            }
        } else if let Some(related) = &options.related_request_id {
            let sink = {
                match self.request_streams.lock().get(related) {
                    Some(ResponseSink::Sse { frames, stream_id }) => {
                        Some((frames.clone(), stream_id.clone()))
                    }
                    _ => None,
                }
            };
            if let Some((frames, stream_id)) = sink {
                let event_id = self.assign_event_id(&stream_id, &message).await;
                if frames
                    .send(SseFrame {
                        event_id,
                        message: message.clone(),
                    })
                    .await
                    .is_ok()
                {
                    return Ok(());
                }
                // Stream body gone; fall back to the standalone path.
            }
        }

        // Persist first so the message survives for replay even if no
        // stream is currently open.
        let event_id = self
            .assign_event_id(&self.standalone_stream_id, &message)
            .await;
        let sender = self.standalone.lock().clone();
        match sender {
            Some(frames) => {
                if frames.send(SseFrame { event_id, message }).await.is_err() {
                    debug!(session_id = self.session_id, "standalone stream consumer gone");
                    *self.standalone.lock() = None;
                }
            }
            None => {
                if self.event_store.is_none() {
                    debug!(
                        session_id = self.session_id,
                        "no open stream and no event store; message dropped"
                    );
                }
            }
        }
        Ok(())
    }

    fn shutdown(&self) {
        *self.standalone.lock() = None;
        // Dropping JSON sinks fails their waiting POST handlers.
        self.request_streams.lock().clear();
    }
}

/// Server-side transport bound to one HTTP session. The HTTP handlers
/// inject decoded inbound messages; outbound messages route through
/// [`SessionStreams`].
pub struct SessionTransport {
    session_id: String,
    inbound_tx: mpsc::Sender<TransportEvent>,
    inbound_rx: parking_lot::Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    pub(crate) streams: Arc<SessionStreams>,
    closed: CancellationToken,
}

impl SessionTransport {
    pub(crate) fn new(session_id: String, event_store: Option<Arc<dyn EventStore>>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        Self {
            streams: Arc::new(SessionStreams::new(session_id.clone(), event_store)),
            session_id,
            inbound_tx,
            inbound_rx: parking_lot::Mutex::new(Some(inbound_rx)),
            closed: CancellationToken::new(),
        }
    }

    /// Hand a decoded client message to the session's peer.
    pub(crate) async fn inject(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.inbound_tx
            .send(TransportEvent::Message(message))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for SessionTransport {
    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        self.inbound_rx
            .lock()
            .take()
            .ok_or(TransportError::NotStarted)
    }

    async fn send(
        &self,
        message: JsonRpcMessage,
        options: TransportSendOptions,
    ) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.streams.route(message, options).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();
        debug!(session_id = self.session_id, "session transport closing");
        self.streams.shutdown();
        let _ = self.inbound_tx.send(TransportEvent::Closed).await;
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }
}

/// One live session: the server instance and its transport.
pub(crate) struct Session {
    pub server: McpServer,
    pub transport: Arc<SessionTransport>,
}

/// Registry of sessions keyed by the minted `mcp-session-id`.
#[derive(Default)]
pub(crate) struct SessionManager {
    sessions: parking_lot::RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn insert(&self, session_id: String, session: Arc<Session>) {
        self.sessions.write().insert(session_id, session);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().remove(session_id)
    }

    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.write().drain().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}

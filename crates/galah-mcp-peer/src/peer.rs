//! The symmetric protocol core.
//!
//! A `Peer` owns one transport. All inbound dispatch happens on a single
//! receive loop; request handlers run on spawned tasks so a handler can
//! issue its own outbound requests (reverse requests) without deadlocking
//! the loop. Outbound requests are correlated through a pending map keyed
//! by request ID and resolved by the loop.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use galah_mcp_protocol::methods;
use galah_mcp_protocol::notifications::{CancelledParams, ProgressParams};
use galah_mcp_protocol::{
    meta, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpError,
    McpResult, ProgressToken, RequestId,
};

use crate::context::RequestContext;
use crate::transport::{Transport, TransportEvent, TransportSendOptions};

/// Deadline applied to outbound requests unless overridden per call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub type ProgressCallback = Arc<dyn Fn(ProgressParams) + Send + Sync>;

type HandlerFuture = Pin<Box<dyn Future<Output = McpResult<Value>> + Send>>;
pub type RequestHandlerFn =
    Arc<dyn Fn(JsonRpcRequest, RequestContext) -> HandlerFuture + Send + Sync>;

type NotificationFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type NotificationHandlerFn =
    Arc<dyn Fn(JsonRpcNotification) -> NotificationFuture + Send + Sync>;

/// Per-call knobs for [`Peer::request`].
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// `None` → [`DEFAULT_REQUEST_TIMEOUT`]; `Some(Duration::ZERO)` disables
    /// the deadline entirely.
    pub timeout: Option<Duration>,
    /// Re-arm the deadline whenever a progress notification arrives for
    /// this request. On by default.
    pub reset_timeout_on_progress: Option<bool>,
    /// Receives `notifications/progress` correlated to this request. Also
    /// opts the request in by attaching `_meta.progressToken`.
    pub on_progress: Option<ProgressCallback>,
    /// Cancelling this token abandons the request: the future fails with
    /// `Cancelled` and `notifications/cancelled` is sent best-effort.
    pub cancel: Option<CancellationToken>,
    /// Threaded through to the transport for causal stream routing.
    pub related_request_id: Option<RequestId>,
    /// Resume marker handed to resumable transports.
    pub resumption_token: Option<String>,
}

struct DeadlineState {
    deadline: parking_lot::Mutex<tokio::time::Instant>,
    timeout: Duration,
    reset_on_progress: bool,
}

struct PendingRequest {
    responder: oneshot::Sender<McpResult<Value>>,
    progress: Option<ProgressCallback>,
    deadline: Option<Arc<DeadlineState>>,
}

struct PeerInner {
    transport: parking_lot::RwLock<Option<Arc<dyn Transport>>>,
    next_request_id: AtomicI64,
    pending: parking_lot::Mutex<HashMap<RequestId, PendingRequest>>,
    /// Inbound requests currently being handled, for remote cancellation.
    in_flight: parking_lot::Mutex<HashMap<RequestId, CancellationToken>>,
    request_handlers: parking_lot::RwLock<HashMap<String, RequestHandlerFn>>,
    notification_handlers: parking_lot::RwLock<HashMap<String, NotificationHandlerFn>>,
    initialized: AtomicBool,
    closed: CancellationToken,
}

/// A symmetric JSON-RPC peer. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

impl Default for Peer {
    fn default() -> Self {
        Self::new()
    }
}

impl Peer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PeerInner {
                transport: parking_lot::RwLock::new(None),
                next_request_id: AtomicI64::new(0),
                pending: parking_lot::Mutex::new(HashMap::new()),
                in_flight: parking_lot::Mutex::new(HashMap::new()),
                request_handlers: parking_lot::RwLock::new(HashMap::new()),
                notification_handlers: parking_lot::RwLock::new(HashMap::new()),
                initialized: AtomicBool::new(false),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Wire up the transport and spawn the receive loop. Fails if already
    /// connected.
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> McpResult<()> {
        {
            let mut slot = self.inner.transport.write();
            if slot.is_some() {
                return Err(McpError::InvalidRequest(
                    "peer is already connected to a transport".into(),
                ));
            }
            *slot = Some(transport.clone());
        }
        let receiver = transport
            .start()
            .await
            .map_err(|e| McpError::Internal(format!("transport start failed: {}", e)))?;
        let peer = self.clone();
        tokio::spawn(async move { peer.receive_loop(receiver).await });
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.read().is_some() && !self.inner.closed.is_cancelled()
    }

    /// Whether the initialization handshake has completed on this side.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Flipped by the role adapters once the handshake finishes.
    pub fn set_initialized(&self, initialized: bool) {
        self.inner.initialized.store(initialized, Ordering::SeqCst);
    }

    /// The transport's session identifier, if the transport has one.
    pub fn session_id(&self) -> Option<String> {
        self.inner.transport.read().as_ref()?.session_id()
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner.transport.read().clone()
    }

    /// Register a request handler. At most one handler per method.
    pub fn set_request_handler<F, Fut>(&self, method: &str, handler: F) -> McpResult<()>
    where
        F: Fn(JsonRpcRequest, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Value>> + Send + 'static,
    {
        let mut handlers = self.inner.request_handlers.write();
        if handlers.contains_key(method) {
            return Err(McpError::InvalidRequest(format!(
                "a request handler for {} is already registered",
                method
            )));
        }
        handlers.insert(
            method.to_string(),
            Arc::new(move |request, context| Box::pin(handler(request, context))),
        );
        Ok(())
    }

    pub fn has_request_handler(&self, method: &str) -> bool {
        self.inner.request_handlers.read().contains_key(method)
    }

    /// Register a notification handler. At most one handler per method.
    pub fn set_notification_handler<F, Fut>(&self, method: &str, handler: F) -> McpResult<()>
    where
        F: Fn(JsonRpcNotification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut handlers = self.inner.notification_handlers.write();
        if handlers.contains_key(method) {
            return Err(McpError::InvalidRequest(format!(
                "a notification handler for {} is already registered",
                method
            )));
        }
        handlers.insert(
            method.to_string(),
            Arc::new(move |notification| Box::pin(handler(notification))),
        );
        Ok(())
    }

    /// Issue a request and await its result.
    ///
    /// The returned future resolves with the peer's result, the peer's
    /// error (code preserved), `RequestTimeout`, `Cancelled`, or
    /// `ConnectionClosed` — whichever happens first.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        if self.inner.closed.is_cancelled() {
            return Err(McpError::ConnectionClosed);
        }
        if !self.is_initialized() && method != methods::INITIALIZE {
            return Err(McpError::InvalidRequest(format!(
                "cannot send {} before initialization completes",
                method
            )));
        }

        let id = RequestId::Number(self.inner.next_request_id.fetch_add(1, Ordering::SeqCst));

        let mut params = params;
        if options.on_progress.is_some() {
            let token = match &id {
                RequestId::Number(n) => ProgressToken::Number(*n),
                RequestId::String(s) => ProgressToken::String(s.clone()),
            };
            let target = params.get_or_insert_with(|| Value::Object(serde_json::Map::new()));
            meta::attach_progress_token(target, &token);
        }

        let timeout = options.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let deadline = (timeout > Duration::ZERO).then(|| {
            Arc::new(DeadlineState {
                deadline: parking_lot::Mutex::new(tokio::time::Instant::now() + timeout),
                timeout,
                reset_on_progress: options.reset_timeout_on_progress.unwrap_or(true),
            })
        });

        let (responder, mut receiver) = oneshot::channel();
        self.inner.pending.lock().insert(
            id.clone(),
            PendingRequest {
                responder,
                progress: options.on_progress.clone(),
                deadline: deadline.clone(),
            },
        );

        let request = JsonRpcRequest::new(id.clone(), method, params);
        let send_options = TransportSendOptions {
            related_request_id: options.related_request_id.clone(),
            resumption_token: options.resumption_token.clone(),
        };
        if let Err(e) = self.send_message(request.into(), send_options).await {
            self.inner.pending.lock().remove(&id);
            warn!(method, error = %e, "request send failed");
            return Err(McpError::ConnectionClosed);
        }

        let cancel = options.cancel.clone();
        loop {
            let sleep_target = deadline.as_ref().map(|d| *d.deadline.lock());
            tokio::select! {
                result = &mut receiver => {
                    return result.unwrap_or(Err(McpError::ConnectionClosed));
                }
                _ = async {
                    match &cancel {
                        Some(token) => token.cancelled().await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.inner.pending.lock().remove(&id);
                    self.notify_cancelled(&id, Some("cancelled by requester".into())).await;
                    return Err(McpError::Cancelled("cancelled by requester".into()));
                }
                _ = async {
                    match sleep_target {
                        Some(target) => tokio::time::sleep_until(target).await,
                        None => std::future::pending().await,
                    }
                } => {
                    // Progress may have pushed the deadline while we slept.
                    if let Some(state) = deadline.as_ref()
                        && *state.deadline.lock() > tokio::time::Instant::now()
                    {
                        continue;
                    }
                    self.inner.pending.lock().remove(&id);
                    self.notify_cancelled(&id, Some("request timed out".into())).await;
                    return Err(McpError::RequestTimeout(timeout.as_millis() as u64));
                }
            }
        }
    }

    /// Fire-and-forget notification.
    pub async fn notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.notification_related(method, params, None).await
    }

    /// Notification carrying the inbound request it was produced under, so
    /// stream-routing transports keep causal order.
    pub async fn notification_related(
        &self,
        method: &str,
        params: Option<Value>,
        related_request_id: Option<RequestId>,
    ) -> McpResult<()> {
        if !self.is_initialized()
            && method != methods::NOTIF_INITIALIZED
            && method != methods::NOTIF_CANCELLED
        {
            return Err(McpError::InvalidRequest(format!(
                "cannot send {} before initialization completes",
                method
            )));
        }
        let message = JsonRpcNotification::new(method, params);
        self.send_message(
            message.into(),
            TransportSendOptions {
                related_request_id,
                resumption_token: None,
            },
        )
        .await
    }

    async fn notify_cancelled(&self, id: &RequestId, reason: Option<String>) {
        let params = CancelledParams {
            request_id: id.clone(),
            reason,
        };
        let message = JsonRpcNotification::new(
            methods::NOTIF_CANCELLED,
            serde_json::to_value(&params).ok(),
        );
        if let Err(e) = self
            .send_message(message.into(), TransportSendOptions::default())
            .await
        {
            debug!(request_id = %id, error = %e, "cancellation notification not delivered");
        }
    }

    async fn send_message(
        &self,
        message: JsonRpcMessage,
        options: TransportSendOptions,
    ) -> McpResult<()> {
        let transport = self
            .inner
            .transport
            .read()
            .clone()
            .ok_or(McpError::ConnectionClosed)?;
        transport.send(message, options).await.map_err(|e| {
            debug!(error = %e, "transport send failed");
            McpError::ConnectionClosed
        })
    }

    /// Close the transport, fail every pending request with
    /// `ConnectionClosed`, and drop all handlers.
    pub async fn close(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        self.inner.closed.cancel();
        let transport = self.inner.transport.read().clone();
        if let Some(transport) = transport {
            let _ = transport.close().await;
        }
        self.fail_all_pending();
        self.inner.request_handlers.write().clear();
        self.inner.notification_handlers.write().clear();
        for (_, token) in self.inner.in_flight.lock().drain() {
            token.cancel();
        }
    }

    fn fail_all_pending(&self) {
        let entries: Vec<PendingRequest> = {
            let mut pending = self.inner.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            let _ = entry.responder.send(Err(McpError::ConnectionClosed));
        }
    }

    async fn receive_loop(self, mut receiver: mpsc::Receiver<TransportEvent>) {
        loop {
            tokio::select! {
                _ = self.inner.closed.cancelled() => break,
                event = receiver.recv() => match event {
                    Some(TransportEvent::Message(message)) => self.handle_message(message).await,
                    Some(TransportEvent::Error(e)) => {
                        warn!(error = %e, "transport error");
                    }
                    Some(TransportEvent::Closed) | None => {
                        debug!("transport closed; failing pending requests");
                        self.close().await;
                        break;
                    }
                }
            }
        }
    }

    async fn handle_message(&self, message: JsonRpcMessage) {
        if let Err(e) = message.validate() {
            warn!(error = %e, "dropping malformed message");
            return;
        }
        match message {
            JsonRpcMessage::Response(response) => self.handle_response(response),
            JsonRpcMessage::Request(request) => self.handle_request(request).await,
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await
            }
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let entry = self.inner.pending.lock().remove(&response.id);
        match entry {
            Some(pending) => {
                let _ = pending.responder.send(response.into_result());
            }
            None => {
                warn!(request_id = %response.id, "response for unknown request dropped");
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) {
        let id = request.id.clone();

        if !self.is_initialized() && request.method != methods::INITIALIZE {
            let error = McpError::InvalidRequest(format!(
                "{} received before initialization completed",
                request.method
            ));
            let response = JsonRpcResponse::from_error(id.clone(), &error);
            let _ = self
                .send_message(response.into(), TransportSendOptions::related_to(id))
                .await;
            return;
        }

        let handler = self.inner.request_handlers.read().get(&request.method).cloned();
        let Some(handler) = handler else {
            let error = McpError::MethodNotFound(request.method.clone());
            let response = JsonRpcResponse::from_error(id.clone(), &error);
            let _ = self
                .send_message(response.into(), TransportSendOptions::related_to(id))
                .await;
            return;
        };

        let cancellation = CancellationToken::new();
        self.inner
            .in_flight
            .lock()
            .insert(id.clone(), cancellation.clone());

        let context = RequestContext::new(
            self.clone(),
            id.clone(),
            cancellation.clone(),
            request.progress_token(),
        );

        // Handlers run off the receive loop so they can issue reverse
        // requests whose responses arrive on this same loop.
        let peer = self.clone();
        tokio::spawn(async move {
            let result = handler(request, context).await;
            peer.inner.in_flight.lock().remove(&id);
            if cancellation.is_cancelled() {
                debug!(request_id = %id, "response suppressed after remote cancellation");
                return;
            }
            let response = match result {
                Ok(value) => JsonRpcResponse::success(id.clone(), value),
                Err(e) => JsonRpcResponse::from_error(id.clone(), &e),
            };
            let _ = peer
                .send_message(response.into(), TransportSendOptions::related_to(id))
                .await;
        });
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        if !self.is_initialized()
            && notification.method != methods::NOTIF_INITIALIZED
            && notification.method != methods::NOTIF_CANCELLED
        {
            warn!(
                method = notification.method,
                "notification before initialization dropped"
            );
            return;
        }

        match notification.method.as_str() {
            methods::NOTIF_CANCELLED => {
                match notification.parse_params::<CancelledParams>() {
                    Ok(params) => {
                        let token = self.inner.in_flight.lock().get(&params.request_id).cloned();
                        if let Some(token) = token {
                            debug!(request_id = %params.request_id, "remote cancellation received");
                            token.cancel();
                        }
                    }
                    Err(e) => warn!(error = %e, "malformed cancellation notification"),
                }
                return;
            }
            methods::NOTIF_PROGRESS => {
                match notification.parse_params::<ProgressParams>() {
                    Ok(params) => self.route_progress(params),
                    Err(e) => warn!(error = %e, "malformed progress notification"),
                }
                return;
            }
            _ => {}
        }

        let handler = self
            .inner
            .notification_handlers
            .read()
            .get(&notification.method)
            .cloned();
        match handler {
            // Inline, not spawned: notification effects (like the
            // initialized flag) must land before later messages dispatch.
            Some(handler) => handler(notification).await,
            None => {
                debug!(method = notification.method, "unhandled notification ignored");
            }
        }
    }

    fn route_progress(&self, params: ProgressParams) {
        let key = match &params.progress_token {
            ProgressToken::Number(n) => RequestId::Number(*n),
            ProgressToken::String(s) => RequestId::String(s.clone()),
        };
        let (progress, deadline) = {
            let pending = self.inner.pending.lock();
            match pending.get(&key) {
                Some(entry) => (entry.progress.clone(), entry.deadline.clone()),
                None => {
                    debug!(token = %params.progress_token, "progress for unknown request dropped");
                    return;
                }
            }
        };
        if let Some(state) = deadline
            && state.reset_on_progress
        {
            *state.deadline.lock() = tokio::time::Instant::now() + state.timeout;
        }
        if let Some(callback) = progress {
            callback(params);
        }
    }
}

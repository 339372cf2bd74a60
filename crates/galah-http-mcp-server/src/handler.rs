//! The HTTP entry point: routing, CORS, security, and the POST/GET/DELETE
//! state machines.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderMap, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use galah_mcp_protocol::{methods, JsonRpcMessage, McpResult};
use galah_mcp_server::McpServer;

use crate::config::HttpServerConfig;
use crate::event_store::EventStore;
use crate::session::{Session, SessionManager, SessionTransport, SseFrame};

pub(crate) const SESSION_ID_HEADER: &str = "mcp-session-id";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";

type HttpBody = BoxBody<Bytes, Infallible>;
type ServerFactory = Arc<dyn Fn() -> McpResult<McpServer> + Send + Sync>;

/// The Streamable HTTP endpoint. Path-agnostic; mount it wherever the host
/// routes `/mcp`.
pub struct StreamableHttpService {
    factory: ServerFactory,
    sessions: SessionManager,
    config: HttpServerConfig,
    event_store: Option<Arc<dyn EventStore>>,
}

impl StreamableHttpService {
    pub fn new<F>(factory: F, config: HttpServerConfig) -> Self
    where
        F: Fn() -> McpResult<McpServer> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            sessions: SessionManager::default(),
            config,
            event_store: None,
        }
    }

    /// Enable reconnect-with-replay via an event store.
    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every session, failing their pending requests.
    pub async fn shutdown(&self) {
        for session in self.sessions.drain() {
            session.server.close().await;
        }
    }

    /// Serve one request against the MCP endpoint.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<HttpBody>
    where
        B: http_body::Body,
        B::Error: std::fmt::Display,
    {
        if request.method() == Method::OPTIONS {
            return empty_response(StatusCode::OK);
        }

        if let Some(authenticator) = &self.config.authenticator
            && !authenticator.authenticate(request.headers()).await
        {
            debug!("request rejected by authenticator");
            return empty_response(StatusCode::FORBIDDEN);
        }
        if let Some(protection) = &self.config.dns_rebinding
            && !protection.validate(request.headers())
        {
            warn!("request failed DNS rebinding validation");
            return empty_response(StatusCode::FORBIDDEN);
        }

        let method = request.method().clone();
        if method == Method::POST {
            self.handle_post(request).await
        } else if method == Method::GET {
            self.handle_get(request.headers()).await
        } else if method == Method::DELETE {
            self.handle_delete(request.headers()).await
        } else {
            empty_response(StatusCode::METHOD_NOT_ALLOWED)
        }
    }

    async fn handle_post<B>(&self, request: Request<B>) -> Response<HttpBody>
    where
        B: http_body::Body,
        B::Error: std::fmt::Display,
    {
        let wants_sse = accepts_event_stream(request.headers());
        let session_header = header_value(request.headers(), SESSION_ID_HEADER);

        let body = match request.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &format!("body read failed: {}", e))
            }
        };
        let text = String::from_utf8_lossy(&body);
        let message = match JsonRpcMessage::from_json(&text) {
            Ok(message) => message,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        };

        let is_initialize =
            matches!(&message, JsonRpcMessage::Request(r) if r.method == methods::INITIALIZE);
        if is_initialize && session_header.is_none() {
            return self.start_session(message).await;
        }

        let Some(session_id) = session_header else {
            return error_response(StatusCode::BAD_REQUEST, "missing mcp-session-id header");
        };
        let Some(session) = self.sessions.get(&session_id) else {
            return error_response(StatusCode::NOT_FOUND, "unknown session");
        };

        match message {
            JsonRpcMessage::Request(request) => {
                if wants_sse {
                    let frames = session.transport.streams.register_sse(request.id.clone());
                    if session.transport.inject(request.into()).await.is_err() {
                        return error_response(StatusCode::NOT_FOUND, "session closed");
                    }
                    sse_response(frames)
                } else {
                    let (sender, receiver) = oneshot::channel();
                    session
                        .transport
                        .streams
                        .register_json(request.id.clone(), sender);
                    if session.transport.inject(request.into()).await.is_err() {
                        return error_response(StatusCode::NOT_FOUND, "session closed");
                    }
                    match receiver.await {
                        Ok(response) => json_response(StatusCode::OK, &response),
                        Err(_) => {
                            error_response(StatusCode::INTERNAL_SERVER_ERROR, "session closed")
                        }
                    }
                }
            }
            // Responses and notifications have nothing to return.
            other => {
                if session.transport.inject(other).await.is_err() {
                    return error_response(StatusCode::NOT_FOUND, "session closed");
                }
                empty_response(StatusCode::ACCEPTED)
            }
        }
    }

    /// First contact: mint a session, build a server through the factory,
    /// and answer the `initialize` request as plain JSON with the session
    /// ID echoed in `mcp-session-id`.
    async fn start_session(&self, message: JsonRpcMessage) -> Response<HttpBody> {
        let JsonRpcMessage::Request(request) = message else {
            return error_response(StatusCode::BAD_REQUEST, "initialize must be a request");
        };

        let server = match (self.factory)() {
            Ok(server) => server,
            Err(e) => {
                warn!(error = %e, "server factory failed");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "server factory failed");
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let transport = Arc::new(SessionTransport::new(
            session_id.clone(),
            self.event_store.clone(),
        ));
        let (sender, receiver) = oneshot::channel();
        transport.streams.register_json(request.id.clone(), sender);

        if let Err(e) = server.connect(transport.clone()).await {
            warn!(error = %e, "session connect failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "session connect failed");
        }
        self.sessions.insert(
            session_id.clone(),
            Arc::new(Session {
                server,
                transport: transport.clone(),
            }),
        );

        if transport.inject(request.into()).await.is_err() {
            self.sessions.remove(&session_id);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "session closed");
        }
        match receiver.await {
            Ok(response) => {
                info!(session_id, "session initialized");
                let mut http_response = json_response(StatusCode::OK, &response);
                if let Ok(value) = session_id.parse() {
                    http_response
                        .headers_mut()
                        .insert(SESSION_ID_HEADER, value);
                }
                http_response
            }
            Err(_) => {
                self.sessions.remove(&session_id);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "initialize failed")
            }
        }
    }

    /// Standalone server→client stream, with replay when the client offers
    /// `Last-Event-ID` and an event store is configured.
    async fn handle_get(&self, headers: &HeaderMap) -> Response<HttpBody> {
        let Some(session_id) = header_value(headers, SESSION_ID_HEADER) else {
            return error_response(StatusCode::BAD_REQUEST, "missing mcp-session-id header");
        };
        let Some(session) = self.sessions.get(&session_id) else {
            return error_response(StatusCode::NOT_FOUND, "unknown session");
        };

        let (sender, frames) = mpsc::channel(64);
        let streams = &session.transport.streams;

        // Install-then-replay under the write lock: live events queue
        // strictly after the replayed ones. Replay itself runs on a task
        // holding the guard, so the response body can start draining while
        // long replays are still being written.
        let guard = streams.write_guard_owned().await;
        if !streams.set_standalone(sender.clone()) {
            drop(guard);
            return error_response(StatusCode::CONFLICT, "standalone stream already open");
        }
        if let Some(last_event_id) = header_value(headers, LAST_EVENT_ID_HEADER)
            && let Some(store) = self.event_store.clone()
        {
            let replay_session = session_id.clone();
            tokio::spawn(async move {
                let _guard = guard;
                match store.replay_events_after(&last_event_id).await {
                    Ok((stream_id, events)) => {
                        debug!(
                            session_id = replay_session,
                            stream_id,
                            count = events.len(),
                            "replaying standalone events"
                        );
                        for event in events {
                            let frame = SseFrame {
                                event_id: event.event_id,
                                message: event.message,
                            };
                            if sender.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    // An unknown marker means resume-from-now.
                    Err(e) => debug!(session_id = replay_session, error = %e, "replay unavailable"),
                }
            });
        } else {
            drop(guard);
        }

        sse_response(frames)
    }

    async fn handle_delete(&self, headers: &HeaderMap) -> Response<HttpBody> {
        if !self.config.allow_client_termination {
            return empty_response(StatusCode::METHOD_NOT_ALLOWED);
        }
        let Some(session_id) = header_value(headers, SESSION_ID_HEADER) else {
            return error_response(StatusCode::BAD_REQUEST, "missing mcp-session-id header");
        };
        let Some(session) = self.sessions.remove(&session_id) else {
            return error_response(StatusCode::NOT_FOUND, "unknown session");
        };
        session.server.close().await;
        info!(session_id, "session terminated by client");
        empty_response(StatusCode::OK)
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn apply_cors(headers: &mut HeaderMap) {
    let entries = [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS"),
        (
            "Access-Control-Allow-Headers",
            "Content-Type, Accept, Authorization, mcp-session-id, Last-Event-ID",
        ),
        ("Access-Control-Expose-Headers", "mcp-session-id"),
        ("Access-Control-Max-Age", "86400"),
    ];
    for (name, value) in entries {
        if let Ok(value) = value.parse() {
            headers.insert(name, value);
        }
    }
}

fn empty_response(status: StatusCode) -> Response<HttpBody> {
    let mut response = Response::new(Full::new(Bytes::new()).boxed());
    *response.status_mut() = status;
    apply_cors(response.headers_mut());
    response
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<HttpBody> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(bytes)).boxed());
    *response.status_mut() = status;
    apply_cors(response.headers_mut());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, "application/json".parse().expect("static header"));
    response
}

fn error_response(status: StatusCode, message: &str) -> Response<HttpBody> {
    json_response(status, &json!({ "error": message }))
}

pub(crate) fn not_found() -> Response<HttpBody> {
    error_response(StatusCode::NOT_FOUND, "no such endpoint")
}

fn sse_response(frames: mpsc::Receiver<SseFrame>) -> Response<HttpBody> {
    let stream = ReceiverStream::new(frames)
        .map(|frame| Ok::<_, Infallible>(Frame::data(Bytes::from(frame.format()))));
    let mut response = Response::new(BodyExt::boxed(StreamBody::new(stream)));
    apply_cors(response.headers_mut());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, "text/event-stream".parse().expect("static header"));
    response
        .headers_mut()
        .insert(CACHE_CONTROL, "no-cache".parse().expect("static header"));
    response
}

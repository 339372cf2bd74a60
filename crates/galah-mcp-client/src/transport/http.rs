//! Streamable HTTP transport (client side).
//!
//! One endpoint, three verbs: POST carries outbound messages and brings
//! back either a JSON response, a per-request SSE stream, or a bare 202;
//! GET opens the standalone server→client stream (resumable via
//! `Last-Event-ID`); DELETE terminates the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use galah_mcp_peer::{Transport, TransportError, TransportEvent, TransportSendOptions};
use galah_mcp_protocol::JsonRpcMessage;

use crate::transport::sse::{ReconnectConfig, SseParser};

pub(crate) const SESSION_ID_HEADER: &str = "mcp-session-id";
pub(crate) const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

const CHANNEL_CAPACITY: usize = 256;

pub struct StreamableHttpTransport {
    client: Client,
    endpoint: Url,
    session_id: Arc<parking_lot::Mutex<Option<String>>>,
    /// Resume marker for the standalone stream only; per-request streams
    /// are never resumed.
    last_event_id: Arc<parking_lot::Mutex<Option<String>>>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    reconnect: ReconnectConfig,
    closed: CancellationToken,
    standalone_open: AtomicBool,
}

impl StreamableHttpTransport {
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        Self::with_config(endpoint, Client::new(), ReconnectConfig::default())
    }

    pub fn with_config(
        endpoint: &str,
        client: Client,
        reconnect: ReconnectConfig,
    ) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TransportError::Http(format!("invalid endpoint url: {}", e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TransportError::Http(format!(
                "unsupported scheme for streamable http: {}",
                endpoint.scheme()
            )));
        }
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Ok(Self {
            client,
            endpoint,
            session_id: Arc::new(parking_lot::Mutex::new(None)),
            last_event_id: Arc::new(parking_lot::Mutex::new(None)),
            events_tx,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
            reconnect,
            closed: CancellationToken::new(),
            standalone_open: AtomicBool::new(false),
        })
    }

    /// Explicitly end the session with `DELETE`. A `405` means the server
    /// does not support client termination; both count as success and the
    /// session ID is cleared locally either way.
    pub async fn terminate_session(&self) -> Result<(), TransportError> {
        let Some(session_id) = self.session_id.lock().clone() else {
            return Ok(());
        };
        let response = self
            .client
            .delete(self.endpoint.clone())
            .header(SESSION_ID_HEADER, &session_id)
            .send()
            .await
            .map_err(|e| TransportError::Http(format!("DELETE failed: {}", e)))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            info!(session_id, %status, "session terminated");
            *self.session_id.lock() = None;
            Ok(())
        } else {
            Err(TransportError::Http(format!(
                "DELETE returned {}",
                status
            )))
        }
    }

    fn capture_session_id(&self, response: &reqwest::Response) {
        if let Some(value) = response.headers().get(SESSION_ID_HEADER)
            && let Ok(session_id) = value.to_str()
        {
            debug!(session_id, "session id captured");
            *self.session_id.lock() = Some(session_id.to_string());
        }
    }

    async fn deliver(&self, raw: &str) {
        match JsonRpcMessage::from_json(raw) {
            Ok(message) => {
                let _ = self.events_tx.send(TransportEvent::Message(message)).await;
            }
            Err(e) => {
                warn!(error = %e, "undecodable message from server dropped");
                let _ = self
                    .events_tx
                    .send(TransportEvent::Error(TransportError::InvalidMessage(
                        e.to_string(),
                    )))
                    .await;
            }
        }
    }

    /// Drain a per-request SSE body, forwarding each event. The stream ends
    /// when the server has written the response.
    fn spawn_stream_reader(&self, response: reqwest::Response) {
        let events_tx = self.events_tx.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut body = response.bytes_stream();
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    chunk = body.next() => match chunk {
                        Some(Ok(bytes)) => {
                            for event in parser.push(&bytes) {
                                match JsonRpcMessage::from_json(&event.data) {
                                    Ok(message) => {
                                        let _ = events_tx.send(TransportEvent::Message(message)).await;
                                    }
                                    Err(e) => warn!(error = %e, "undecodable SSE event dropped"),
                                }
                            }
                        }
                        Some(Err(e)) => {
                            debug!(error = %e, "per-request stream ended with error");
                            break;
                        }
                        None => break,
                    }
                }
            }
        });
    }

    fn spawn_standalone_loop(&self, resume_from: Option<String>) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let session_id = self.session_id.clone();
        let last_event_id = self.last_event_id.clone();
        let events_tx = self.events_tx.clone();
        let closed = self.closed.clone();
        let reconnect = self.reconnect.clone();

        if let Some(token) = resume_from {
            *last_event_id.lock() = Some(token);
        }

        tokio::spawn(async move {
            let mut attempt: u32 = 0;
            'reconnect: loop {
                if closed.is_cancelled() {
                    break;
                }
                let mut request = client
                    .get(endpoint.clone())
                    .header(ACCEPT, "text/event-stream");
                if let Some(session_id) = session_id.lock().clone() {
                    request = request.header(SESSION_ID_HEADER, session_id);
                }
                if let Some(last) = last_event_id.lock().clone() {
                    request = request.header(LAST_EVENT_ID_HEADER, last);
                }

                match request.send().await {
                    Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                        debug!("server offers no standalone stream");
                        break;
                    }
                    Ok(response) if response.status() == StatusCode::CONFLICT => {
                        debug!("standalone stream already open elsewhere");
                        break;
                    }
                    Ok(response) if response.status().is_success() => {
                        attempt = 0;
                        let mut parser = SseParser::new();
                        let mut body = response.bytes_stream();
                        loop {
                            tokio::select! {
                                _ = closed.cancelled() => break 'reconnect,
                                chunk = body.next() => match chunk {
                                    Some(Ok(bytes)) => {
                                        for event in parser.push(&bytes) {
                                            if let Some(id) = &event.id {
                                                *last_event_id.lock() = Some(id.clone());
                                            }
                                            match JsonRpcMessage::from_json(&event.data) {
                                                Ok(message) => {
                                                    let _ = events_tx
                                                        .send(TransportEvent::Message(message))
                                                        .await;
                                                }
                                                Err(e) => warn!(error = %e, "undecodable SSE event dropped"),
                                            }
                                        }
                                    }
                                    Some(Err(e)) => {
                                        debug!(error = %e, "standalone stream interrupted");
                                        break;
                                    }
                                    None => {
                                        debug!("standalone stream closed by server");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Ok(response) => {
                        warn!(status = %response.status(), "standalone stream rejected");
                    }
                    Err(e) => {
                        warn!(error = %e, "standalone stream connect failed");
                    }
                }

                if attempt >= reconnect.max_retries {
                    let _ = events_tx
                        .send(TransportEvent::Error(TransportError::Http(
                            "standalone stream: retries exhausted".into(),
                        )))
                        .await;
                    break;
                }
                let delay = reconnect.delay_for(attempt);
                attempt += 1;
                debug!(attempt, ?delay, "standalone stream backing off");
                tokio::select! {
                    _ = closed.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        self.events_rx
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
        let body = message
            .to_json()
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_BOTH)
            .body(body);
        if let Some(session_id) = self.session_id.lock().clone() {
            request = request.header(SESSION_ID_HEADER, session_id);
        }
        if let Some(token) = &options.resumption_token {
            request = request.header(LAST_EVENT_ID_HEADER, token.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Http(format!("POST failed: {}", e)))?;
        self.capture_session_id(&response);

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!(
                "POST returned {}: {}",
                status, detail
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("text/event-stream") {
            self.spawn_stream_reader(response);
        } else if content_type.starts_with("application/json") {
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::Http(format!("body read failed: {}", e)))?;
            self.deliver(&text).await;
        } else if !content_type.is_empty() {
            return Err(TransportError::Http(format!(
                "unexpected content type: {}",
                content_type
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();
        let _ = self.events_tx.send(TransportEvent::Closed).await;
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    async fn open_standalone_stream(&self) -> Result<(), TransportError> {
        if self.standalone_open.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.spawn_standalone_loop(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_schemes() {
        assert!(StreamableHttpTransport::new("ftp://host/mcp").is_err());
        assert!(StreamableHttpTransport::new("not a url").is_err());
        assert!(StreamableHttpTransport::new("http://host/mcp").is_ok());
    }

    #[tokio::test]
    async fn test_start_is_single_use() {
        let transport = StreamableHttpTransport::new("http://localhost:1/mcp").unwrap();
        transport.start().await.unwrap();
        assert!(matches!(
            transport.start().await.unwrap_err(),
            TransportError::NotStarted
        ));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let transport = StreamableHttpTransport::new("http://localhost:1/mcp").unwrap();
        transport.close().await.unwrap();
        let err = transport
            .send(
                galah_mcp_protocol::JsonRpcNotification::new("notifications/initialized", None)
                    .into(),
                TransportSendOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}

//! Per-request context threaded into request handlers.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use galah_mcp_protocol::methods;
use galah_mcp_protocol::notifications::ProgressParams;
use galah_mcp_protocol::{McpResult, ProgressToken, RequestId};

use crate::peer::{Peer, RequestOptions};

/// Everything a handler may need beyond its params: the request ID, a
/// cooperative cancellation signal tripped by `notifications/cancelled`,
/// and a way to talk back through the owning peer. Notifications and
/// requests sent through this context carry the inbound request ID so
/// stream-routing transports preserve causal order.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub cancellation: CancellationToken,
    pub progress_token: Option<ProgressToken>,
    peer: Peer,
}

impl RequestContext {
    pub(crate) fn new(
        peer: Peer,
        request_id: RequestId,
        cancellation: CancellationToken,
        progress_token: Option<ProgressToken>,
    ) -> Self {
        Self {
            request_id,
            cancellation,
            progress_token,
            peer,
        }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Transport session this request arrived on, if any.
    pub fn session_id(&self) -> Option<String> {
        self.peer.session_id()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Send a notification attributed to this request.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.peer
            .notification_related(method, params, Some(self.request_id.clone()))
            .await
    }

    /// Issue a reverse request to the peer while this request is still
    /// being handled. The response threads back through the pending map.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        mut options: RequestOptions,
    ) -> McpResult<Value> {
        options.related_request_id = Some(self.request_id.clone());
        self.peer.request(method, params, options).await
    }

    /// Emit `notifications/progress` against this request's progress token.
    /// A no-op when the requester did not opt in.
    pub async fn report_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> McpResult<()> {
        let Some(token) = &self.progress_token else {
            return Ok(());
        };
        let params = ProgressParams {
            progress_token: token.clone(),
            progress,
            total,
            message,
        };
        self.send_notification(methods::NOTIF_PROGRESS, Some(serde_json::to_value(&params)?))
            .await
    }
}

//! Execution context handed to tool callbacks.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use galah_mcp_peer::{assert_client_capability, RequestContext, RequestOptions};
use galah_mcp_protocol::methods;
use galah_mcp_protocol::{
    CreateMessageParams, CreateMessageResult, ElicitCreateParams, ElicitResult, McpError,
    McpResult,
};

use crate::server::McpServer;
use crate::tasks::TaskSession;

/// What a running tool can do beyond computing its result: check for
/// cancellation, report progress, and pose elicitation/sampling questions
/// to the client.
///
/// For a direct call the context is bound to the live `tools/call` request;
/// reverse requests go straight out over the protocol. For a task-augmented
/// call the original request has already been answered, so reverse requests
/// are queued on the task and forwarded by the `tasks/result` handler.
pub struct ToolContext {
    server: McpServer,
    request: Option<RequestContext>,
    task: Option<TaskSession>,
}

impl ToolContext {
    pub(crate) fn direct(server: McpServer, request: RequestContext) -> Self {
        Self {
            server,
            request: Some(request),
            task: None,
        }
    }

    pub(crate) fn for_task(server: McpServer, task: TaskSession) -> Self {
        Self {
            server,
            request: None,
            task: Some(task),
        }
    }

    pub fn is_task(&self) -> bool {
        self.task.is_some()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task.as_ref().map(|t| t.task_id())
    }

    /// Tripped by `notifications/cancelled` (direct calls) or `tasks/cancel`
    /// (task calls). Tools should abort cooperatively.
    pub fn cancellation(&self) -> CancellationToken {
        if let Some(task) = &self.task {
            task.cancellation()
        } else if let Some(request) = &self.request {
            request.cancellation.clone()
        } else {
            CancellationToken::new()
        }
    }

    /// Ask the client for structured user input and suspend until it
    /// answers. Requires the client's `elicitation` capability.
    pub async fn elicit(
        &self,
        message: impl Into<String>,
        requested_schema: Value,
    ) -> McpResult<ElicitResult> {
        if let Some(task) = &self.task {
            return task.elicit(message, requested_schema).await;
        }
        self.assert_client(methods::ELICITATION_CREATE)?;
        let params = ElicitCreateParams::form(message, requested_schema);
        let request = self.live_request()?;
        let value = request
            .send_request(
                methods::ELICITATION_CREATE,
                Some(serde_json::to_value(&params)?),
                untimed(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the client to run an LLM inference on the server's behalf.
    /// Requires the client's `sampling` capability.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> McpResult<CreateMessageResult> {
        if let Some(task) = &self.task {
            return task.create_message(params).await;
        }
        self.assert_client(methods::SAMPLING_CREATE_MESSAGE)?;
        let request = self.live_request()?;
        let value = request
            .send_request(
                methods::SAMPLING_CREATE_MESSAGE,
                Some(serde_json::to_value(&params)?),
                untimed(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Emit progress against the originating request. A no-op for task
    /// calls, whose originating request completed when the task was created.
    pub async fn report_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> McpResult<()> {
        match &self.request {
            Some(request) => request.report_progress(progress, total, message).await,
            None => Ok(()),
        }
    }

    fn live_request(&self) -> McpResult<&RequestContext> {
        self.request.as_ref().ok_or_else(|| {
            McpError::Internal("tool context has neither a live request nor a task".into())
        })
    }

    fn assert_client(&self, method: &str) -> McpResult<()> {
        let capabilities = self
            .server
            .client_capabilities()
            .ok_or_else(|| McpError::InvalidRequest("client capabilities not yet known".into()))?;
        assert_client_capability(&capabilities, method)
    }
}

/// Reverse requests wait on humans and models; no deadline.
pub(crate) fn untimed() -> RequestOptions {
    RequestOptions {
        timeout: Some(std::time::Duration::ZERO),
        ..Default::default()
    }
}

//! Task execution: the per-task session handed to tools, the background
//! runner, and the `tasks/result` loop that drives a task to terminal while
//! forwarding its queued reverse requests.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use galah_mcp_peer::{assert_client_capability, RequestContext, RequestOptions};
use galah_mcp_protocol::methods;
use galah_mcp_protocol::{
    meta, CallToolResult, CreateMessageParams, CreateMessageResult, ElicitCreateParams,
    ElicitResult, McpError, McpResult, Task, TaskResultParams, TaskStatus,
};
use galah_mcp_tasks::TaskStoreError;

use crate::context::ToolContext;
use crate::server::{McpServer, ToolCallback};

/// Handle to a running task, given to the tool implementation. Suspending
/// operations queue a server→client request on the task and resume with the
/// peer's answer once a `tasks/result` call forwards it.
#[derive(Clone)]
pub struct TaskSession {
    task_id: String,
    server: McpServer,
    cancellation: CancellationToken,
}

impl TaskSession {
    pub(crate) fn new(server: McpServer, task_id: String, cancellation: CancellationToken) -> Self {
        Self {
            task_id,
            server,
            cancellation,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Suspend the tool on a question to the user. The task moves to
    /// `input_required` while the question is outstanding and back to
    /// `working` once answered.
    pub async fn elicit(
        &self,
        message: impl Into<String>,
        requested_schema: Value,
    ) -> McpResult<ElicitResult> {
        self.assert_client(methods::ELICITATION_CREATE)?;
        let params = ElicitCreateParams::form(message, requested_schema);
        self.server
            .set_task_status(
                &self.task_id,
                TaskStatus::InputRequired,
                Some(params.message.clone()),
            )
            .await?;
        let value = self
            .ask_peer(methods::ELICITATION_CREATE, serde_json::to_value(&params)?)
            .await?;
        self.server
            .set_task_status(&self.task_id, TaskStatus::Working, None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Suspend the tool on an LLM call performed by the client.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> McpResult<CreateMessageResult> {
        self.assert_client(methods::SAMPLING_CREATE_MESSAGE)?;
        let value = self
            .ask_peer(
                methods::SAMPLING_CREATE_MESSAGE,
                serde_json::to_value(&params)?,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn ask_peer(&self, method: &str, params: Value) -> McpResult<Value> {
        let receiver = self
            .server
            .task_queue()
            .enqueue(&self.task_id, method, Some(params));
        tokio::select! {
            _ = self.cancellation.cancelled() => {
                Err(McpError::Cancelled("task cancelled".into()))
            }
            answer = receiver => {
                answer.map_err(|_| McpError::Cancelled("task disposed".into()))?
            }
        }
    }

    fn assert_client(&self, method: &str) -> McpResult<()> {
        let capabilities = self
            .server
            .client_capabilities()
            .ok_or_else(|| McpError::InvalidRequest("client capabilities not yet known".into()))?;
        assert_client_capability(&capabilities, method)
    }
}

/// Run a tool in the background on behalf of a task, storing its terminal
/// outcome. Tool-level errors become a `failed` task carrying an `isError`
/// result; cancellation leaves the store alone (the cancel path already
/// moved it).
pub(crate) fn spawn_task_execution(
    server: McpServer,
    callback: ToolCallback,
    arguments: serde_json::Map<String, Value>,
    task: Task,
) {
    let task_id = task.task_id;
    let cancellation = CancellationToken::new();
    server.register_running_task(&task_id, cancellation.clone());

    let session = TaskSession::new(server.clone(), task_id.clone(), cancellation.clone());
    let context = ToolContext::for_task(server.clone(), session);

    tokio::spawn(async move {
        let outcome = tokio::select! {
            _ = cancellation.cancelled() => None,
            result = callback(arguments, context) => Some(result),
        };
        match outcome {
            Some(Ok(result)) => {
                let status = if result.is_error == Some(true) {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Completed
                };
                server.finish_task(&task_id, status, result).await;
            }
            Some(Err(McpError::Cancelled(reason))) => {
                debug!(task_id, reason, "task execution cancelled");
            }
            Some(Err(e)) => {
                server
                    .finish_task(&task_id, TaskStatus::Failed, CallToolResult::error(e.to_string()))
                    .await;
            }
            None => {
                debug!(task_id, "task execution aborted by cancellation");
            }
        }
        server.unregister_running_task(&task_id);
        server.task_queue().remove(&task_id);
    });
}

/// The `tasks/result` loop.
///
/// Waiters are installed before state reads so no update or queued message
/// posted in between is lost. Queued reverse requests are forwarded under
/// the live `tasks/result` request, which keeps their traffic on that
/// request's stream.
pub(crate) async fn handle_task_result(
    server: McpServer,
    context: RequestContext,
    params: TaskResultParams,
) -> McpResult<Value> {
    let task_id = params.task_id;
    loop {
        let mut watcher = server.task_store().watch_task(&task_id).await?;

        while let Some(queued) = server.task_queue().dequeue(&task_id) {
            debug!(task_id, method = queued.method, "forwarding queued task request");
            let answer = context
                .send_request(
                    &queued.method,
                    queued.params.clone(),
                    RequestOptions {
                        timeout: Some(Duration::ZERO),
                        ..Default::default()
                    },
                )
                .await;
            if let Err(e) = &answer {
                warn!(task_id, method = queued.method, error = %e, "queued task request failed");
            }
            let _ = queued.responder.send(answer);
        }

        let task = server.task_store().get_task(&task_id).await?;
        if task.status.is_terminal() {
            let result = match server.task_store().get_task_result(&task_id).await {
                Ok(result) => result,
                Err(TaskStoreError::ResultMissing(_)) => {
                    CallToolResult::text("Task completed but no result found")
                }
                Err(e) => return Err(e.into()),
            };
            let mut value = serde_json::to_value(result)?;
            meta::attach_related_task(&mut value, &task_id);
            return Ok(value);
        }

        tokio::select! {
            changed = watcher.changed() => {
                if changed.is_err() {
                    // Store dropped the task (TTL expiry) while we waited.
                    return Err(McpError::InvalidParams(format!("Task not found: {}", task_id)));
                }
            }
            _ = server.task_queue().wait_for_message(&task_id) => {}
        }
    }
}

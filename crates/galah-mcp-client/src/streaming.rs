//! Task-augmented tool calls as an update stream.
//!
//! `call_tool_stream` hides the direct/task split: a plain result yields a
//! single update, a created task yields `TaskCreated`, interleaved
//! `TaskStatus` polls, and finally the result or an error. Polling and the
//! blocking `tasks/result` request run concurrently; whichever way
//! `tasks/result` resolves ends the stream.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use galah_mcp_peer::RequestOptions;
use galah_mcp_protocol::{
    CallToolParams, CallToolResult, CreateTaskResult, McpError, McpResult, Task, TaskMetadata,
};

use crate::client::McpClient;

/// Default cadence when the server does not suggest a `pollInterval`.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// One element of the stream produced by [`McpClient::call_tool_stream`].
#[derive(Debug)]
pub enum ToolCallUpdate {
    /// The task the server created for this call
    TaskCreated(Task),
    /// A polled status snapshot
    TaskStatus(Task),
    /// The final result; always the last update on success
    Result(CallToolResult),
    /// Terminal failure; always the last update on error
    Error(McpError),
}

impl McpClient {
    /// Invoke a tool with task-based execution and observe it as a stream
    /// of updates.
    pub async fn call_tool_stream(
        &self,
        name: impl Into<String>,
        arguments: Option<serde_json::Map<String, Value>>,
        task: TaskMetadata,
    ) -> McpResult<mpsc::Receiver<ToolCallUpdate>> {
        let params = CallToolParams {
            name: name.into(),
            arguments,
            task: Some(task),
            meta: None,
        };
        let value = self.call_tool_raw(params, RequestOptions::default()).await?;

        let (updates, receiver) = mpsc::channel(16);

        // A server that ignored the task augmentation answers with a plain
        // result; surface it as a one-element stream.
        if value.get("task").is_none() {
            let result: CallToolResult = serde_json::from_value(value)?;
            let _ = updates.send(ToolCallUpdate::Result(result)).await;
            return Ok(receiver);
        }

        let created: CreateTaskResult = serde_json::from_value(value)?;
        let poll_interval = Duration::from_millis(
            created.task.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );
        let task_id = created.task.task_id.clone();
        let _ = updates.send(ToolCallUpdate::TaskCreated(created.task)).await;

        let client = self.clone();
        tokio::spawn(async move {
            let result_call = client.task_result(&task_id);
            tokio::pin!(result_call);
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so polls trail creation.
            ticker.tick().await;

            loop {
                tokio::select! {
                    outcome = &mut result_call => {
                        let update = match outcome {
                            Ok(result) => ToolCallUpdate::Result(result),
                            Err(e) => ToolCallUpdate::Error(e),
                        };
                        let _ = updates.send(update).await;
                        return;
                    }
                    _ = ticker.tick() => {
                        match client.get_task(&task_id).await {
                            Ok(snapshot) => {
                                if updates.send(ToolCallUpdate::TaskStatus(snapshot)).await.is_err() {
                                    debug!(task_id, "stream consumer dropped; stopping poller");
                                    return;
                                }
                            }
                            Err(e) => {
                                // Keep waiting on tasks/result: the poll may
                                // have lost a race with TTL expiry.
                                debug!(task_id, error = %e, "task poll failed");
                            }
                        }
                    }
                }
            }
        });

        Ok(receiver)
    }
}

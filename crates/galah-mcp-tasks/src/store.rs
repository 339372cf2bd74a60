//! The `TaskStore` trait.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use galah_mcp_protocol::{CallToolResult, Task, TaskMetadata, TaskStatus};

use crate::error::TaskStoreError;

/// Storage backend for tasks. All methods are safe to call concurrently;
/// implementations serialize mutation of individual task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task for the named tool call. Starts `Working`.
    async fn create_task(
        &self,
        name: &str,
        input: Value,
        metadata: &TaskMetadata,
    ) -> Result<Task, TaskStoreError>;

    async fn get_task(&self, task_id: &str) -> Result<Task, TaskStoreError>;

    async fn get_all_tasks(&self) -> Result<Vec<Task>, TaskStoreError>;

    /// Transition a task's status, enforcing the state machine. Terminal
    /// states are sticky.
    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
    ) -> Result<Task, TaskStoreError>;

    /// Store the final result and move the task to the given terminal
    /// status in one step.
    async fn store_task_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: CallToolResult,
    ) -> Result<Task, TaskStoreError>;

    /// Read the stored result. Fails with `NotTerminal` while the task is
    /// still running and `ResultMissing` if it finished without one.
    async fn get_task_result(&self, task_id: &str) -> Result<CallToolResult, TaskStoreError>;

    /// Move a task to `Cancelled`. Fails on terminal tasks.
    async fn cancel_task(
        &self,
        task_id: &str,
        reason: Option<String>,
    ) -> Result<Task, TaskStoreError>;

    /// Subscribe to a task's update stream. The receiver's value changes on
    /// every status or result mutation and errors out when the task is
    /// disposed. Subscribe **before** reading state to avoid lost wakeups.
    async fn watch_task(
        &self,
        task_id: &str,
    ) -> Result<watch::Receiver<u64>, TaskStoreError>;

    /// Drop tasks whose TTL has elapsed, waking their watchers. Returns the
    /// removed IDs.
    async fn remove_expired(&self) -> Result<Vec<String>, TaskStoreError>;
}

//! In-memory `TaskStore` backed by a mutex-protected map and per-task
//! watch channels for update futures.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use galah_mcp_protocol::{CallToolResult, Task, TaskMetadata, TaskStatus};

use crate::error::TaskStoreError;
use crate::state_machine::validate_transition;
use crate::store::TaskStore;

struct TaskEntry {
    task: Task,
    /// The tool call that created the task, kept for diagnostics
    tool_name: String,
    input: Value,
    /// Wall-clock creation instant for TTL arithmetic
    created: tokio::time::Instant,
    result: Option<CallToolResult>,
    /// Bumped on every mutation; dropping the sender wakes watchers with an
    /// error, signalling disposal
    version: watch::Sender<u64>,
}

impl TaskEntry {
    fn touch(&mut self) {
        self.task.last_updated_at = Utc::now().to_rfc3339();
        self.version.send_modify(|v| *v += 1);
    }
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: parking_lot::Mutex<HashMap<String, TaskEntry>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// The tool call that created a task, while the task is retained.
    pub fn task_origin(&self, task_id: &str) -> Option<(String, Value)> {
        self.tasks
            .lock()
            .get(task_id)
            .map(|entry| (entry.tool_name.clone(), entry.input.clone()))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(
        &self,
        name: &str,
        input: Value,
        metadata: &TaskMetadata,
    ) -> Result<Task, TaskStoreError> {
        let now = Utc::now().to_rfc3339();
        let task = Task {
            task_id: Uuid::new_v4().to_string(),
            status: TaskStatus::Working,
            status_message: None,
            created_at: now.clone(),
            last_updated_at: now,
            ttl: metadata.ttl,
            poll_interval: metadata.poll_interval,
            meta: None,
        };
        debug!(task_id = task.task_id, tool = name, "task created");
        let (version, _) = watch::channel(0);
        self.tasks.lock().insert(
            task.task_id.clone(),
            TaskEntry {
                task: task.clone(),
                tool_name: name.to_string(),
                input,
                created: tokio::time::Instant::now(),
                result: None,
                version,
            },
        );
        Ok(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, TaskStoreError> {
        self.tasks
            .lock()
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| TaskStoreError::NotFound(task_id.to_string()))
    }

    async fn get_all_tasks(&self) -> Result<Vec<Task>, TaskStoreError> {
        Ok(self
            .tasks
            .lock()
            .values()
            .map(|entry| entry.task.clone())
            .collect())
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
    ) -> Result<Task, TaskStoreError> {
        let mut tasks = self.tasks.lock();
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskStoreError::NotFound(task_id.to_string()))?;
        validate_transition(entry.task.status, status)?;
        entry.task.status = status;
        entry.task.status_message = status_message;
        entry.touch();
        debug!(task_id, %status, "task status updated");
        Ok(entry.task.clone())
    }

    async fn store_task_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: CallToolResult,
    ) -> Result<Task, TaskStoreError> {
        if !status.is_terminal() {
            return Err(TaskStoreError::InvalidTransition {
                from: status,
                to: status,
            });
        }
        let mut tasks = self.tasks.lock();
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskStoreError::NotFound(task_id.to_string()))?;
        validate_transition(entry.task.status, status)?;
        entry.task.status = status;
        entry.result = Some(result);
        entry.touch();
        debug!(task_id, %status, "task result stored");
        Ok(entry.task.clone())
    }

    async fn get_task_result(&self, task_id: &str) -> Result<CallToolResult, TaskStoreError> {
        let tasks = self.tasks.lock();
        let entry = tasks
            .get(task_id)
            .ok_or_else(|| TaskStoreError::NotFound(task_id.to_string()))?;
        if !entry.task.status.is_terminal() {
            return Err(TaskStoreError::NotTerminal(task_id.to_string()));
        }
        entry
            .result
            .clone()
            .ok_or_else(|| TaskStoreError::ResultMissing(task_id.to_string()))
    }

    async fn cancel_task(
        &self,
        task_id: &str,
        reason: Option<String>,
    ) -> Result<Task, TaskStoreError> {
        self.update_task_status(task_id, TaskStatus::Cancelled, reason)
            .await
    }

    async fn watch_task(
        &self,
        task_id: &str,
    ) -> Result<watch::Receiver<u64>, TaskStoreError> {
        self.tasks
            .lock()
            .get(task_id)
            .map(|entry| entry.version.subscribe())
            .ok_or_else(|| TaskStoreError::NotFound(task_id.to_string()))
    }

    async fn remove_expired(&self) -> Result<Vec<String>, TaskStoreError> {
        let now = tokio::time::Instant::now();
        let mut tasks = self.tasks.lock();
        let expired: Vec<String> = tasks
            .iter()
            .filter(|(_, entry)| {
                entry
                    .task
                    .ttl
                    .is_some_and(|ttl| now.duration_since(entry.created).as_millis() as u64 >= ttl)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            // Dropping the entry drops the watch sender, which completes
            // any waiters with a disposal error.
            tasks.remove(id);
            debug!(task_id = id, "task expired and removed");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(ttl: Option<u64>) -> TaskMetadata {
        TaskMetadata {
            ttl,
            poll_interval: Some(50),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryTaskStore::new();
        let task = store
            .create_task("echo", json!({}), &metadata(None))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Working);
        assert!(task.created_at <= task.last_updated_at);

        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.task_id, task.task_id);
        assert_eq!(fetched.poll_interval, Some(50));

        let (tool_name, _input) = store.task_origin(&task.task_id).unwrap();
        assert_eq!(tool_name, "echo");
    }

    #[tokio::test]
    async fn test_result_unreadable_until_terminal() {
        let store = InMemoryTaskStore::new();
        let task = store
            .create_task("echo", json!({}), &metadata(None))
            .await
            .unwrap();

        let err = store.get_task_result(&task.task_id).await.unwrap_err();
        assert!(matches!(err, TaskStoreError::NotTerminal(_)));

        store
            .store_task_result(&task.task_id, TaskStatus::Completed, CallToolResult::text("hi"))
            .await
            .unwrap();
        let result = store.get_task_result(&task.task_id).await.unwrap();
        assert_eq!(result.content[0].as_text(), Some("hi"));
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let store = InMemoryTaskStore::new();
        let task = store
            .create_task("echo", json!({}), &metadata(None))
            .await
            .unwrap();
        store
            .store_task_result(&task.task_id, TaskStatus::Completed, CallToolResult::text("x"))
            .await
            .unwrap();

        let err = store
            .update_task_status(&task.task_id, TaskStatus::Working, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskStoreError::TerminalState(TaskStatus::Completed)));
        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_watch_sees_updates_registered_before_read() {
        let store = InMemoryTaskStore::new();
        let task = store
            .create_task("echo", json!({}), &metadata(None))
            .await
            .unwrap();

        let mut watcher = store.watch_task(&task.task_id).await.unwrap();
        store
            .update_task_status(&task.task_id, TaskStatus::InputRequired, None)
            .await
            .unwrap();
        watcher.changed().await.unwrap();
        assert_eq!(
            store.get_task(&task.task_id).await.unwrap().status,
            TaskStatus::InputRequired
        );
    }

    #[tokio::test]
    async fn test_expired_tasks_are_removed_and_watchers_complete() {
        let store = InMemoryTaskStore::new();
        let task = store
            .create_task("echo", json!({}), &metadata(Some(0)))
            .await
            .unwrap();
        let mut watcher = store.watch_task(&task.task_id).await.unwrap();

        let removed = store.remove_expired().await.unwrap();
        assert_eq!(removed, vec![task.task_id.clone()]);
        assert!(matches!(
            store.get_task(&task.task_id).await.unwrap_err(),
            TaskStoreError::NotFound(_)
        ));
        // Sender dropped: the watcher resolves with an error.
        assert!(watcher.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let store = InMemoryTaskStore::new();
        let task = store
            .create_task("echo", json!({}), &metadata(None))
            .await
            .unwrap();
        let cancelled = store
            .cancel_task(&task.task_id, Some("user request".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert_eq!(cancelled.status_message.as_deref(), Some("user request"));

        let err = store.cancel_task(&task.task_id, None).await.unwrap_err();
        assert!(matches!(err, TaskStoreError::TerminalState(_)));
    }
}

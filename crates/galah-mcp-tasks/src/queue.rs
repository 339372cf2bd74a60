//! Per-task FIFO of server→client requests queued by a running tool.
//!
//! The tool side enqueues a request and suspends on the responder; the
//! `tasks/result` handler drains the queue, forwards each request over the
//! live protocol, and completes the responder with the peer's answer.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Notify};

use galah_mcp_protocol::{McpError, McpResult};

/// One queued server→client request and the channel its answer returns on.
pub struct QueuedRequest {
    pub method: String,
    pub params: Option<Value>,
    pub responder: oneshot::Sender<McpResult<Value>>,
}

#[derive(Default)]
struct QueueEntry {
    messages: VecDeque<QueuedRequest>,
    notify: Arc<Notify>,
}

/// FIFO queues keyed by task ID with "message available" waiters.
#[derive(Default)]
pub struct TaskMessageQueue {
    entries: parking_lot::Mutex<HashMap<String, QueueEntry>>,
}

impl TaskMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request and wake every waiter. Returns the receiver the
    /// caller suspends on.
    pub fn enqueue(
        &self,
        task_id: &str,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> oneshot::Receiver<McpResult<Value>> {
        let (responder, receiver) = oneshot::channel();
        let mut entries = self.entries.lock();
        let entry = entries.entry(task_id.to_string()).or_default();
        entry.messages.push_back(QueuedRequest {
            method: method.into(),
            params,
            responder,
        });
        entry.notify.notify_waiters();
        receiver
    }

    /// Pop the oldest queued request, if any.
    pub fn dequeue(&self, task_id: &str) -> Option<QueuedRequest> {
        self.entries
            .lock()
            .get_mut(task_id)
            .and_then(|entry| entry.messages.pop_front())
    }

    /// Suspend until the task's queue is non-empty. Returns immediately if
    /// it already is. The waiter is registered before the emptiness check,
    /// so an enqueue between check and sleep cannot be lost.
    pub async fn wait_for_message(&self, task_id: &str) {
        loop {
            let notify = {
                let mut entries = self.entries.lock();
                let entry = entries.entry(task_id.to_string()).or_default();
                if !entry.messages.is_empty() {
                    return;
                }
                entry.notify.clone()
            };
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_empty(task_id) {
                return;
            }
            notified.await;
        }
    }

    fn is_empty(&self, task_id: &str) -> bool {
        self.entries
            .lock()
            .get(task_id)
            .map(|entry| entry.messages.is_empty())
            .unwrap_or(true)
    }

    /// Drop a task's queue, failing any still-queued requests.
    pub fn remove(&self, task_id: &str) {
        if let Some(entry) = self.entries.lock().remove(task_id) {
            for queued in entry.messages {
                let _ = queued
                    .responder
                    .send(Err(McpError::Cancelled("task disposed".into())));
            }
            entry.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_enqueue_then_dequeue_fifo() {
        let queue = TaskMessageQueue::new();
        let _rx1 = queue.enqueue("t", "elicitation/create", Some(json!({"n": 1})));
        let _rx2 = queue.enqueue("t", "sampling/createMessage", Some(json!({"n": 2})));

        let first = queue.dequeue("t").unwrap();
        assert_eq!(first.method, "elicitation/create");
        let second = queue.dequeue("t").unwrap();
        assert_eq!(second.method, "sampling/createMessage");
        assert!(queue.dequeue("t").is_none());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_nonempty() {
        let queue = TaskMessageQueue::new();
        let _rx = queue.enqueue("t", "ping", None);
        tokio::time::timeout(Duration::from_millis(10), queue.wait_for_message("t"))
            .await
            .expect("wait should not block on a non-empty queue");
    }

    #[tokio::test]
    async fn test_wait_wakes_on_enqueue() {
        let queue = Arc::new(TaskMessageQueue::new());
        let waiter = queue.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_message("t").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _rx = queue.enqueue("t", "ping", None);
        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_responder_receives_answer() {
        let queue = TaskMessageQueue::new();
        let rx = queue.enqueue("t", "elicitation/create", None);
        let queued = queue.dequeue("t").unwrap();
        queued.responder.send(Ok(json!({"action": "accept"}))).unwrap();
        let answer = rx.await.unwrap().unwrap();
        assert_eq!(answer["action"], "accept");
    }

    #[tokio::test]
    async fn test_remove_fails_queued_requests() {
        let queue = TaskMessageQueue::new();
        let rx = queue.enqueue("t", "elicitation/create", None);
        queue.remove("t");
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Cancelled(_)));
    }
}

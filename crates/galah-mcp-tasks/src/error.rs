//! Task storage error type and its mapping onto wire errors.

use galah_mcp_protocol::{McpError, TaskStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskStoreError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task is in terminal state {0} and cannot transition")]
    TerminalState(TaskStatus),

    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Result read attempted before the task reached a terminal state.
    #[error("Task {0} has not completed; result is not available")]
    NotTerminal(String),

    #[error("Task {0} completed but no result was stored")]
    ResultMissing(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<TaskStoreError> for McpError {
    fn from(e: TaskStoreError) -> Self {
        match e {
            TaskStoreError::NotFound(_)
            | TaskStoreError::NotTerminal(_)
            | TaskStoreError::TerminalState(_)
            | TaskStoreError::InvalidTransition { .. } => McpError::InvalidParams(e.to_string()),
            TaskStoreError::ResultMissing(_) | TaskStoreError::Storage(_) => {
                McpError::Internal(e.to_string())
            }
        }
    }
}

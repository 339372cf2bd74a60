//! # Task storage
//!
//! Long-running tool calls become externally observable tasks. This crate
//! owns the task state machine, the [`TaskStore`] trait with its in-memory
//! implementation, and the per-task queue that carries server→client
//! requests produced while a task is still running.
//!
//! Each server instance owns its own store; tasks are never visible across
//! instances.

pub mod error;
pub mod in_memory;
pub mod queue;
pub mod state_machine;
pub mod store;

pub use error::TaskStoreError;
pub use in_memory::InMemoryTaskStore;
pub use queue::{QueuedRequest, TaskMessageQueue};
pub use state_machine::validate_transition;
pub use store::TaskStore;

//! Task lifecycle enforcement.
//!
//! ```text
//! Pending       -> Working | Completed | Failed | Cancelled
//! Working       -> InputRequired | Completed | Failed | Cancelled
//! InputRequired -> Working | Completed | Failed | Cancelled
//! Completed/Failed/Cancelled -> ERROR (terminal is sticky)
//! ```

use crate::error::TaskStoreError;
use galah_mcp_protocol::TaskStatus;

/// Validate one status transition; terminal states admit none.
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), TaskStoreError> {
    if from.is_terminal() {
        return Err(TaskStoreError::TerminalState(from));
    }
    let allowed = match from {
        TaskStatus::Pending => !matches!(to, TaskStatus::Pending),
        TaskStatus::Working => !matches!(to, TaskStatus::Pending | TaskStatus::Working),
        TaskStatus::InputRequired => {
            !matches!(to, TaskStatus::Pending | TaskStatus::InputRequired)
        }
        // Terminal handled above
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(TaskStoreError::InvalidTransition { from, to })
    }
}

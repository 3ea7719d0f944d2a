use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one task.
///
/// ```text
/// Idle -> Running -> { Success | NoData | Failure | Cancelled }
/// ```
///
/// Terminal states are absorbing; only a fresh start returns to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Success,
    NoData,
    Failure,
    Cancelled,
}

impl TaskState {
    /// Check if this state represents a finished task
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::NoData | TaskState::Failure | TaskState::Cancelled
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// Legal edges of the lifecycle.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match (self, next) {
            (TaskState::Running, next) => next.is_terminal(),
            (current, TaskState::Running) => !current.is_running(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::NoData => "no_data",
            TaskState::Failure => "failure",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

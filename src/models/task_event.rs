//! # Task Event Model
//!
//! Append-only audit records for task lifecycle transitions. Events are
//! recorded only when the task's type opts in (see
//! [`crate::models::task_type::EventRecordingRule`]) and are never mutated
//! independently of their task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle event categories a task type may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    StepCompleted,
    TaskCompleted,
    TaskFailed,
    TaskCanceled,
    TaskSuspended,
    TaskUnsuspended,
    /// A retryable failure scheduled another attempt
    TaskRetryScheduled,
    /// The executor asked to be re-run later
    TaskDelayed,
    /// A hung task was swept back into the claim pool
    TaskReset,
}

impl fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StepCompleted => "step_completed",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskCanceled => "task_canceled",
            Self::TaskSuspended => "task_suspended",
            Self::TaskUnsuspended => "task_unsuspended",
            Self::TaskRetryScheduled => "task_retry_scheduled",
            Self::TaskDelayed => "task_delayed",
            Self::TaskReset => "task_reset",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "step_completed" => Ok(Self::StepCompleted),
            "task_completed" => Ok(Self::TaskCompleted),
            "task_failed" => Ok(Self::TaskFailed),
            "task_canceled" => Ok(Self::TaskCanceled),
            "task_suspended" => Ok(Self::TaskSuspended),
            "task_unsuspended" => Ok(Self::TaskUnsuspended),
            "task_retry_scheduled" => Ok(Self::TaskRetryScheduled),
            "task_delayed" => Ok(Self::TaskDelayed),
            "task_reset" => Ok(Self::TaskReset),
            _ => Err(format!("Invalid task event type: {s}")),
        }
    }
}

/// One appended audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    pub task_id: Uuid,
    pub event_type: TaskEventType,
    /// Step that was active when the event fired
    pub task_step: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Snapshot of the task data, when the recording rule asks for it
    pub task_data: Option<String>,
}

impl TaskEvent {
    pub fn new(
        task_id: Uuid,
        event_type: TaskEventType,
        task_step: Option<String>,
        task_data: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_id,
            event_type,
            task_step,
            timestamp: Utc::now(),
            task_data,
        }
    }
}

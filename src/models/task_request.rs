//! Caller-facing request for queueing a new task.

use serde::{Deserialize, Serialize};

/// Request payload accepted by `queue_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTaskRequest {
    /// Task type code; must reference an existing, enabled type
    pub task_type: String,
    /// Optional grouping key for bulk cancel/suspend
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Optional unique lookup key
    #[serde(default)]
    pub external_reference: Option<String>,
    /// Opaque payload handed verbatim to the executor
    pub data: String,
    /// Create the task in `Suspended` instead of `Queued`
    #[serde(default)]
    pub suspended: bool,
}

impl QueueTaskRequest {
    pub fn new(task_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            batch_id: None,
            external_reference: None,
            data: data.into(),
            suspended: false,
        }
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    pub fn suspended(mut self) -> Self {
        self.suspended = true;
        self
    }
}

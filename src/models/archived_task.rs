//! # Archived Task Model
//!
//! Append-only copy of a terminal task, relocated out of the active store
//! so the claimable table stays small. The task's audit trail travels with
//! the archive record as an embedded event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Task, TaskEvent};
use crate::state_machine::TaskStatus;

/// Verbatim snapshot of a terminal task at archival time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedTask {
    pub id: Uuid,
    pub task_type: String,
    pub batch_id: Option<String>,
    pub external_reference: Option<String>,
    pub status: TaskStatus,
    pub step: Option<String>,
    pub data: String,
    pub execution_attempts: i32,
    pub queued: DateTime<Utc>,
    pub executed: Option<DateTime<Utc>>,
    pub archived_at: DateTime<Utc>,
    /// Audit trail captured from the active store before deletion
    pub event_log: Vec<TaskEvent>,
}

impl ArchivedTask {
    /// Build the archive copy of a task together with its event history.
    pub fn from_task(task: &Task, event_log: Vec<TaskEvent>, archived_at: DateTime<Utc>) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type.clone(),
            batch_id: task.batch_id.clone(),
            external_reference: task.external_reference.clone(),
            status: task.status,
            step: task.step.clone(),
            data: task.data.clone(),
            execution_attempts: task.execution_attempts,
            queued: task.queued,
            executed: task.executed,
            archived_at,
            event_log,
        }
    }
}

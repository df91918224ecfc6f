//! # Task Type Model
//!
//! Immutable-per-version configuration for a kind of task: which executor
//! runs it, how often it retries, when it counts as hung, and which
//! lifecycle events are recorded to its audit trail.

use serde::{Deserialize, Serialize};

use crate::models::task_event::TaskEventType;

/// Configuration record keyed by a globally unique `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskType {
    /// Globally unique identifier, referenced by `Task::task_type`
    pub code: String,
    /// Human-readable display name
    pub name: String,
    /// Claim-ordering hint; higher claims first
    pub priority: i32,
    /// Id of a registered executor implementation
    pub executor: String,
    /// Disabled types reject new queue requests
    pub enabled: bool,
    pub maximum_execution_attempts: i32,
    /// Wait before a retryable failure re-enters the claim pool
    pub retry_delay_ms: i64,
    /// An `executing` task older than this is presumed abandoned
    pub execution_timeout_ms: i64,
    pub archive_completed: bool,
    pub archive_failed: bool,
    /// Which lifecycle events are persisted, and whether each embeds a
    /// snapshot of the task data
    pub recorded_events: Vec<EventRecordingRule>,
}

/// Per-type opt-in for one audit event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecordingRule {
    pub event_type: TaskEventType,
    pub with_task_data: bool,
}

/// Fields for task type creation, validated by the lifecycle controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTaskType {
    pub code: String,
    pub name: String,
    pub priority: i32,
    pub executor: String,
    pub enabled: bool,
    pub maximum_execution_attempts: i32,
    pub retry_delay_ms: i64,
    pub execution_timeout_ms: i64,
    pub archive_completed: bool,
    pub archive_failed: bool,
    pub recorded_events: Vec<EventRecordingRule>,
}

impl NewTaskType {
    /// A type with conservative defaults: priority 0, enabled, three
    /// attempts, one-minute retry delay, five-minute timeout, archive both
    /// terminal outcomes, no recorded events.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        executor: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            priority: 0,
            executor: executor.into(),
            enabled: true,
            maximum_execution_attempts: 3,
            retry_delay_ms: 60_000,
            execution_timeout_ms: 300_000,
            archive_completed: true,
            archive_failed: true,
            recorded_events: Vec::new(),
        }
    }

    pub fn into_task_type(self) -> TaskType {
        TaskType {
            code: self.code,
            name: self.name,
            priority: self.priority,
            executor: self.executor,
            enabled: self.enabled,
            maximum_execution_attempts: self.maximum_execution_attempts,
            retry_delay_ms: self.retry_delay_ms,
            execution_timeout_ms: self.execution_timeout_ms,
            archive_completed: self.archive_completed,
            archive_failed: self.archive_failed,
            recorded_events: self.recorded_events,
        }
    }
}

impl TaskType {
    /// Look up the recording rule for an event type, if configured.
    pub fn recording_rule(&self, event_type: TaskEventType) -> Option<&EventRecordingRule> {
        self.recorded_events
            .iter()
            .find(|rule| rule.event_type == event_type)
    }

    /// Whether terminal tasks of this type in the given success state
    /// should be copied to the archive before deletion.
    pub fn archives(&self, completed: bool) -> bool {
        if completed {
            self.archive_completed
        } else {
            self.archive_failed
        }
    }
}

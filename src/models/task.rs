//! # Task Model
//!
//! The mutable unit of work driven through the status lifecycle.
//!
//! ## Overview
//!
//! A `Task` is created by `queue_task`, claimed atomically by a worker,
//! executed through its type's executor, and eventually lands in a terminal
//! status from which the archiver may relocate it.
//!
//! ## Key invariants
//!
//! - `id` is globally unique and time-orderable (UUID v7).
//! - `status == Executing` implies `lock_name` is set; a task that is not
//!   being executed carries no lock.
//! - `data` is an opaque payload; the engine persists it verbatim and never
//!   interprets it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::TaskStatus;

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// TaskType code governing executor, retries, timeout and archiving
    pub task_type: String,
    /// Caller-assigned grouping key for bulk cancel/suspend
    pub batch_id: Option<String>,
    /// Caller-assigned unique lookup key
    pub external_reference: Option<String>,
    pub status: TaskStatus,
    /// Current step name; `None` for single-step tasks
    pub step: Option<String>,
    /// Opaque serialized payload, handed verbatim to the executor
    pub data: String,
    /// Ordering hint denormalized from the task type at queue time.
    /// Higher values claim first.
    pub priority: i32,
    pub execution_attempts: i32,
    pub queued: DateTime<Utc>,
    /// Timestamp of the most recent claim
    pub executed: Option<DateTime<Utc>>,
    /// Earliest time the task may be claimed again; `None` means immediately
    pub next_execution: Option<DateTime<Utc>>,
    /// Identity of the worker currently holding the task
    pub lock_name: Option<String>,
}

/// Fields for task creation; the id and timestamps are assigned on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub task_type: String,
    pub batch_id: Option<String>,
    pub external_reference: Option<String>,
    pub data: String,
    pub priority: i32,
    pub suspended: bool,
}

impl NewTask {
    /// Materialize a full task row with a fresh time-ordered id.
    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        Task {
            id: Uuid::now_v7(),
            task_type: self.task_type,
            batch_id: self.batch_id,
            external_reference: self.external_reference,
            status: if self.suspended {
                TaskStatus::Suspended
            } else {
                TaskStatus::Queued
            },
            step: None,
            data: self.data,
            priority: self.priority,
            execution_attempts: 0,
            queued: now,
            executed: None,
            next_execution: None,
            lock_name: None,
        }
    }
}

impl Task {
    /// Whether the task is eligible for `claim_next_task` at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Queued
            && self.next_execution.map_or(true, |at| at <= now)
    }

    /// Whether the lock invariant holds for the current row.
    pub fn lock_consistent(&self) -> bool {
        if self.status.is_active() {
            self.lock_name.is_some()
        } else {
            // A suspend/cancel racing an in-flight attempt may briefly keep
            // the lock until the attempt's outcome is applied.
            self.status == TaskStatus::Suspended || self.lock_name.is_none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(suspended: bool) -> Task {
        NewTask {
            task_type: "send_mail".to_string(),
            batch_id: None,
            external_reference: None,
            data: "{}".to_string(),
            priority: 2,
            suspended,
        }
        .into_task(Utc::now())
    }

    #[test]
    fn test_new_task_defaults() {
        let task = new_task(false);
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.execution_attempts, 0);
        assert!(task.step.is_none());
        assert!(task.lock_name.is_none());
        assert!(task.next_execution.is_none());
    }

    #[test]
    fn test_suspended_on_creation() {
        let task = new_task(true);
        assert_eq!(task.status, TaskStatus::Suspended);
    }

    #[test]
    fn test_claimable_respects_next_execution() {
        let mut task = new_task(false);
        let now = Utc::now();
        assert!(task.is_claimable(now));

        task.next_execution = Some(now + chrono::Duration::seconds(30));
        assert!(!task.is_claimable(now));
        assert!(task.is_claimable(now + chrono::Duration::seconds(31)));

        task.status = TaskStatus::Suspended;
        task.next_execution = None;
        assert!(!task.is_claimable(now));
    }

    #[test]
    fn test_ids_are_time_orderable() {
        let a = new_task(false);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_task(false);
        assert!(a.id < b.id);
    }
}

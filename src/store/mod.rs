//! # Task Store Boundary
//!
//! Durable record of tasks, task types, events and archived tasks. The
//! engine coordinates concurrent workers exclusively through this trait's
//! atomic primitives; any backend that honors the contracts below can host
//! the engine.
//!
//! ## Atomicity contracts
//!
//! - [`TaskStore::claim_next_task`] must be atomic: under any number of
//!   concurrent callers, exactly one worker claims a given task.
//! - [`TaskStore::complete_attempt`] is conditional on the claiming
//!   worker's lock so that a cancel racing the attempt wins and the
//!   attempt's outcome is dropped.
//! - [`TaskStore::transition_status`] and [`TaskStore::reset_task`] are
//!   conditional compare-and-set operations on a single row.
//!
//! Two implementations ship with the crate: [`MemoryTaskStore`] (one mutex,
//! trivially atomic, used by tests and embedded deployments) and
//! [`PgTaskStore`] (`FOR UPDATE SKIP LOCKED` claiming).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{ArchivedTask, Page, SummaryQuery, Task, TaskEvent, TaskSummary, TaskType};
use crate::state_machine::TaskStatus;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome fields written back when an execution attempt finishes.
///
/// Applied only while the row still carries `worker_id`'s lock and a status
/// of `Executing` or `Suspended`. A `Suspended` row accepts terminal
/// targets but maps a `Queued` target back to `Suspended` (the suspension
/// requested mid-attempt wins over a re-queue).
#[derive(Debug, Clone)]
pub struct AttemptUpdate {
    pub task_id: Uuid,
    pub worker_id: String,
    /// Target status: `Completed`, `Failed` or `Queued`
    pub status: TaskStatus,
    pub step: Option<String>,
    pub data: String,
    pub next_execution: Option<DateTime<Utc>>,
    /// Undo the claim's attempt increment. Set for a delayed outcome, which
    /// must not consume a retry attempt.
    pub rewind_attempt: bool,
}

/// Durable storage contract for the task execution engine.
#[async_trait]
pub trait TaskStore: Send + Sync {
    // --- tasks ---

    /// Insert a new task row. An id or external-reference collision is a
    /// [`StoreError::Conflict`].
    async fn insert_task(&self, task: Task) -> StoreResult<()>;

    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>>;

    async fn find_task_by_external_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<Task>>;

    async fn external_reference_exists(&self, reference: &str) -> StoreResult<bool>;

    /// Atomically claim the next eligible task: status `Queued`,
    /// `next_execution` unset or `<= now`, ordered by priority (descending)
    /// then queue time then id. The claimed row is moved to `Executing`
    /// with `lock_name = worker_id`, `executed = now` and
    /// `execution_attempts` incremented.
    async fn claim_next_task(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Task>>;

    /// Apply an execution attempt's outcome; see [`AttemptUpdate`]. Returns
    /// the updated row, or `None` when the lock condition no longer holds
    /// and the outcome was dropped.
    async fn complete_attempt(&self, update: AttemptUpdate) -> StoreResult<Option<Task>>;

    /// Compare-and-set status transition. Returns the updated row, or
    /// `None` when the current status is not in `from`. Clears
    /// `next_execution`; clears `lock_name` except when suspending an
    /// `Executing` row (the in-flight attempt still needs its lock to
    /// deliver a terminal outcome).
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> StoreResult<Option<Task>>;

    /// Batch form of [`TaskStore::transition_status`] over all tasks with
    /// `batch_id`. Not a single cross-row transaction; each row transition
    /// is individually atomic. Returns the transitioned rows.
    async fn transition_batch(
        &self,
        batch_id: &str,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> StoreResult<Vec<Task>>;

    /// Tasks stuck in `Executing` past their type's `execution_timeout_ms`
    /// as of `now`.
    async fn find_hung_tasks(&self, now: DateTime<Utc>) -> StoreResult<Vec<Task>>;

    /// Force a presumed-abandoned task back to `Queued` without touching
    /// `execution_attempts`. Conditional on the row still being `Executing`
    /// with the observed lock and claim timestamp, so a worker that was
    /// merely slow cannot be clobbered.
    async fn reset_task(
        &self,
        id: Uuid,
        lock_name: &str,
        executed_seen: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn find_task_summaries(&self, query: &SummaryQuery)
        -> StoreResult<Page<TaskSummary>>;

    async fn delete_task(&self, id: Uuid) -> StoreResult<bool>;

    // --- task types ---

    /// Insert a task type; a duplicate code is a [`StoreError::Conflict`].
    async fn insert_task_type(&self, task_type: TaskType) -> StoreResult<()>;

    async fn find_task_type(&self, code: &str) -> StoreResult<Option<TaskType>>;

    // --- events ---

    async fn append_event(&self, event: TaskEvent) -> StoreResult<()>;

    /// Events for one task, oldest first.
    async fn find_events_for_task(&self, task_id: Uuid) -> StoreResult<Vec<TaskEvent>>;

    async fn delete_events_for_task(&self, task_id: Uuid) -> StoreResult<u64>;

    // --- archive ---

    /// Terminal (`Completed`/`Failed`) tasks whose last execution (or queue
    /// time, if never executed) is at or before `cutoff`.
    async fn find_archivable_tasks(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Task>>;

    /// Idempotent archive insert: re-archiving an already archived id is a
    /// no-op, so a partially failed sweep can simply run again.
    async fn insert_archived_task(&self, archived: ArchivedTask) -> StoreResult<()>;

    async fn find_archived_task(&self, id: Uuid) -> StoreResult<Option<ArchivedTask>>;
}

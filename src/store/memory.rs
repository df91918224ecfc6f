//! # In-Memory Task Store
//!
//! A single-process [`TaskStore`] holding every table behind one
//! `parking_lot::Mutex`. Each operation is one critical section, which
//! makes the claim and compare-and-set contracts trivially atomic. Used by
//! the test suite and by embedded deployments that do not need durability.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{ArchivedTask, Page, SummaryQuery, Task, TaskEvent, TaskSummary, TaskType};
use crate::models::{SortDirection, SummarySortField};
use crate::state_machine::TaskStatus;
use crate::store::{AttemptUpdate, StoreResult, TaskStore};

#[derive(Default)]
struct Tables {
    tasks: HashMap<Uuid, Task>,
    task_types: HashMap<String, TaskType>,
    events: HashMap<Uuid, Vec<TaskEvent>>,
    archive: HashMap<Uuid, ArchivedTask>,
}

/// Mutex-backed store for tests and embedded use.
#[derive(Default)]
pub struct MemoryTaskStore {
    tables: Mutex<Tables>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-archived) tasks, for test assertions.
    pub fn task_count(&self) -> usize {
        self.tables.lock().tasks.len()
    }

    fn apply_attempt(task: &mut Task, update: &AttemptUpdate) -> Task {
        // A suspension requested mid-attempt wins over a re-queue but not
        // over a terminal outcome.
        let target = if task.status == TaskStatus::Suspended
            && update.status == TaskStatus::Queued
        {
            TaskStatus::Suspended
        } else {
            update.status
        };
        task.status = target;
        task.step = update.step.clone();
        task.data = update.data.clone();
        task.next_execution = if target == TaskStatus::Queued {
            update.next_execution
        } else {
            None
        };
        if update.rewind_attempt {
            task.execution_attempts -= 1;
        }
        task.lock_name = None;
        task.clone()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert_task(&self, task: Task) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        if tables.tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(format!("task id {}", task.id)));
        }
        if let Some(reference) = &task.external_reference {
            if tables
                .tasks
                .values()
                .any(|t| t.external_reference.as_deref() == Some(reference))
            {
                return Err(StoreError::Conflict(format!(
                    "external reference {reference}"
                )));
            }
        }
        tables.tasks.insert(task.id, task);
        Ok(())
    }

    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.tables.lock().tasks.get(&id).cloned())
    }

    async fn find_task_by_external_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<Task>> {
        Ok(self
            .tables
            .lock()
            .tasks
            .values()
            .find(|t| t.external_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn external_reference_exists(&self, reference: &str) -> StoreResult<bool> {
        Ok(self
            .tables
            .lock()
            .tasks
            .values()
            .any(|t| t.external_reference.as_deref() == Some(reference)))
    }

    async fn claim_next_task(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Task>> {
        let mut tables = self.tables.lock();
        let next_id = tables
            .tasks
            .values()
            .filter(|t| t.is_claimable(now))
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.queued.cmp(&b.queued))
                    .then(a.id.cmp(&b.id))
            })
            .map(|t| t.id);

        let Some(id) = next_id else {
            return Ok(None);
        };
        let task = tables.tasks.get_mut(&id).expect("selected id exists");
        task.status = TaskStatus::Executing;
        task.lock_name = Some(worker_id.to_string());
        task.executed = Some(now);
        task.execution_attempts += 1;
        task.next_execution = None;
        Ok(Some(task.clone()))
    }

    async fn complete_attempt(&self, update: AttemptUpdate) -> StoreResult<Option<Task>> {
        let mut tables = self.tables.lock();
        let Some(task) = tables.tasks.get_mut(&update.task_id) else {
            return Ok(None);
        };
        if task.lock_name.as_deref() != Some(update.worker_id.as_str()) {
            return Ok(None);
        }
        if !matches!(task.status, TaskStatus::Executing | TaskStatus::Suspended) {
            return Ok(None);
        }
        Ok(Some(Self::apply_attempt(task, &update)))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> StoreResult<Option<Task>> {
        let mut tables = self.tables.lock();
        let Some(task) = tables.tasks.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&task.status) {
            return Ok(None);
        }
        let keep_lock = to == TaskStatus::Suspended && task.status == TaskStatus::Executing;
        task.status = to;
        task.next_execution = None;
        if !keep_lock {
            task.lock_name = None;
        }
        Ok(Some(task.clone()))
    }

    async fn transition_batch(
        &self,
        batch_id: &str,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> StoreResult<Vec<Task>> {
        let ids: Vec<Uuid> = {
            let tables = self.tables.lock();
            tables
                .tasks
                .values()
                .filter(|t| t.batch_id.as_deref() == Some(batch_id) && from.contains(&t.status))
                .map(|t| t.id)
                .collect()
        };
        let mut transitioned = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.transition_status(id, from, to).await? {
                transitioned.push(task);
            }
        }
        Ok(transitioned)
    }

    async fn find_hung_tasks(&self, now: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        let tables = self.tables.lock();
        let mut hung = Vec::new();
        for task in tables.tasks.values() {
            if task.status != TaskStatus::Executing {
                continue;
            }
            let Some(task_type) = tables.task_types.get(&task.task_type) else {
                continue;
            };
            let Some(executed) = task.executed else {
                continue;
            };
            if executed + Duration::milliseconds(task_type.execution_timeout_ms) < now {
                hung.push(task.clone());
            }
        }
        Ok(hung)
    }

    async fn reset_task(
        &self,
        id: Uuid,
        lock_name: &str,
        executed_seen: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let Some(task) = tables.tasks.get_mut(&id) else {
            return Ok(false);
        };
        if task.status != TaskStatus::Executing
            || task.lock_name.as_deref() != Some(lock_name)
            || task.executed != Some(executed_seen)
        {
            return Ok(false);
        }
        task.status = TaskStatus::Queued;
        task.lock_name = None;
        task.next_execution = None;
        Ok(true)
    }

    async fn find_task_summaries(
        &self,
        query: &SummaryQuery,
    ) -> StoreResult<Page<TaskSummary>> {
        let tables = self.tables.lock();
        let mut matches: Vec<&Task> =
            tables.tasks.values().filter(|t| query.matches(t)).collect();

        matches.sort_by(|a, b| {
            let ordering = match query.sort_field {
                SummarySortField::Queued => a.queued.cmp(&b.queued),
                SummarySortField::Type => a.task_type.cmp(&b.task_type),
                SummarySortField::Status => a.status.to_string().cmp(&b.status.to_string()),
            };
            let ordering = ordering.then(a.id.cmp(&b.id));
            match query.sort_direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .map(TaskSummary::from)
            .collect();

        Ok(Page {
            items,
            total,
            page_index: query.page_index,
            page_size: query.page_size,
        })
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.lock().tasks.remove(&id).is_some())
    }

    async fn insert_task_type(&self, task_type: TaskType) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        if tables.task_types.contains_key(&task_type.code) {
            return Err(StoreError::Conflict(format!(
                "task type code {}",
                task_type.code
            )));
        }
        tables.task_types.insert(task_type.code.clone(), task_type);
        Ok(())
    }

    async fn find_task_type(&self, code: &str) -> StoreResult<Option<TaskType>> {
        Ok(self.tables.lock().task_types.get(code).cloned())
    }

    async fn append_event(&self, event: TaskEvent) -> StoreResult<()> {
        self.tables
            .lock()
            .events
            .entry(event.task_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn find_events_for_task(&self, task_id: Uuid) -> StoreResult<Vec<TaskEvent>> {
        let mut events = self
            .tables
            .lock()
            .events
            .get(&task_id)
            .cloned()
            .unwrap_or_default();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn delete_events_for_task(&self, task_id: Uuid) -> StoreResult<u64> {
        Ok(self
            .tables
            .lock()
            .events
            .remove(&task_id)
            .map_or(0, |events| events.len() as u64))
    }

    async fn find_archivable_tasks(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Task>> {
        let tables = self.tables.lock();
        let mut candidates: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| {
                matches!(t.status, TaskStatus::Completed | TaskStatus::Failed)
                    && t.executed.unwrap_or(t.queued) <= cutoff
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.queued.cmp(&b.queued).then(a.id.cmp(&b.id)));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn insert_archived_task(&self, archived: ArchivedTask) -> StoreResult<()> {
        self.tables
            .lock()
            .archive
            .entry(archived.id)
            .or_insert(archived);
        Ok(())
    }

    async fn find_archived_task(&self, id: Uuid) -> StoreResult<Option<ArchivedTask>> {
        Ok(self.tables.lock().archive.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTask;

    fn queued_task(priority: i32) -> Task {
        NewTask {
            task_type: "send_mail".to_string(),
            batch_id: None,
            external_reference: None,
            data: "{}".to_string(),
            priority,
            suspended: false,
        }
        .into_task(Utc::now())
    }

    #[tokio::test]
    async fn test_claim_orders_by_priority_then_queue_time() {
        let store = MemoryTaskStore::new();
        let low = queued_task(1);
        let high = queued_task(5);
        store.insert_task(low.clone()).await.unwrap();
        store.insert_task(high.clone()).await.unwrap();

        let first = store.claim_next_task("w1", Utc::now()).await.unwrap().unwrap();
        assert_eq!(first.id, high.id);
        assert_eq!(first.status, TaskStatus::Executing);
        assert_eq!(first.execution_attempts, 1);
        assert_eq!(first.lock_name.as_deref(), Some("w1"));

        let second = store.claim_next_task("w1", Utc::now()).await.unwrap().unwrap();
        assert_eq!(second.id, low.id);

        assert!(store.claim_next_task("w1", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_external_reference_conflicts() {
        let store = MemoryTaskStore::new();
        let mut a = queued_task(1);
        a.external_reference = Some("ref".to_string());
        let mut b = queued_task(1);
        b.external_reference = Some("ref".to_string());
        store.insert_task(a).await.unwrap();
        assert!(matches!(
            store.insert_task(b).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_attempt_dropped_after_cancel() {
        let store = MemoryTaskStore::new();
        let task = queued_task(1);
        store.insert_task(task.clone()).await.unwrap();
        let claimed = store.claim_next_task("w1", Utc::now()).await.unwrap().unwrap();

        // Cancel while the attempt is in flight.
        let canceled = store
            .transition_status(claimed.id, &[TaskStatus::Executing], TaskStatus::Canceled)
            .await
            .unwrap()
            .unwrap();
        assert!(canceled.lock_name.is_none());

        let applied = store
            .complete_attempt(AttemptUpdate {
                task_id: claimed.id,
                worker_id: "w1".to_string(),
                status: TaskStatus::Completed,
                step: None,
                data: "{}".to_string(),
                next_execution: None,
                rewind_attempt: false,
            })
            .await
            .unwrap();
        assert!(applied.is_none());
        let current = store.find_task(claimed.id).await.unwrap().unwrap();
        assert_eq!(current.status, TaskStatus::Canceled);
    }

    #[tokio::test]
    async fn test_suspend_in_flight_overrides_requeue_but_not_completion() {
        let store = MemoryTaskStore::new();
        let task = queued_task(1);
        store.insert_task(task.clone()).await.unwrap();
        let claimed = store.claim_next_task("w1", Utc::now()).await.unwrap().unwrap();

        let suspended = store
            .transition_status(claimed.id, &[TaskStatus::Executing], TaskStatus::Suspended)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(suspended.lock_name.as_deref(), Some("w1"));

        let applied = store
            .complete_attempt(AttemptUpdate {
                task_id: claimed.id,
                worker_id: "w1".to_string(),
                status: TaskStatus::Queued,
                step: None,
                data: "{}".to_string(),
                next_execution: None,
                rewind_attempt: false,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.status, TaskStatus::Suspended);
        assert!(applied.lock_name.is_none());
    }
}

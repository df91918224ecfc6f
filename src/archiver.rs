//! # Archiver
//!
//! Relocates terminal tasks out of the active store once they age past the
//! retention window, keeping the claimable table small. Tasks whose type
//! disables archiving for their terminal state are deleted without an
//! archive copy.
//!
//! The sweep only ever touches `Completed`/`Failed` rows, so it is safe to
//! run concurrently with any number of worker loops, and the archive
//! insert is an id-keyed upsert, so a sweep interrupted after copying but
//! before deleting simply re-runs.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{ArchivedTask, TaskType};
use crate::state_machine::TaskStatus;
use crate::store::TaskStore;

pub struct Archiver {
    store: Arc<dyn TaskStore>,
    retention_days: AtomicI64,
    batch_size: usize,
}

impl Archiver {
    pub fn new(store: Arc<dyn TaskStore>, retention_days: i64, batch_size: usize) -> Self {
        Self {
            store,
            retention_days: AtomicI64::new(retention_days),
            batch_size,
        }
    }

    /// Change the retention window at runtime. `0` archives immediately
    /// (useful for deterministic tests).
    pub fn set_retention_days(&self, days: i64) {
        self.retention_days.store(days, Ordering::Relaxed);
        info!(retention_days = days, "Historical task retention updated");
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days.load(Ordering::Relaxed)
    }

    pub async fn get_archived_task(&self, id: Uuid) -> Result<ArchivedTask> {
        self.store
            .find_archived_task(id)
            .await?
            .ok_or(EngineError::ArchivedTaskNotFound(id))
    }

    /// Relocate every terminal task older than the retention window.
    /// Returns the number of tasks removed from the active store.
    #[instrument(skip(self))]
    pub async fn archive_and_delete_historical_tasks(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.retention_days());
        let candidates = self
            .store
            .find_archivable_tasks(cutoff, self.batch_size)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut types: HashMap<String, TaskType> = HashMap::new();
        let mut removed = 0usize;
        for task in candidates {
            let task_type = match types.get(&task.task_type) {
                Some(t) => t.clone(),
                None => {
                    let t = self
                        .store
                        .find_task_type(&task.task_type)
                        .await?
                        .ok_or_else(|| EngineError::TaskTypeNotFound(task.task_type.clone()))?;
                    types.insert(task.task_type.clone(), t.clone());
                    t
                }
            };

            let completed = task.status == TaskStatus::Completed;
            if task_type.archives(completed) {
                let event_log = self.store.find_events_for_task(task.id).await?;
                let archived = ArchivedTask::from_task(&task, event_log, Utc::now());
                self.store.insert_archived_task(archived).await?;
                debug!(task_id = %task.id, status = %task.status, "Task archived");
            } else {
                debug!(task_id = %task.id, status = %task.status, "Task deleted without archive");
            }

            self.store.delete_events_for_task(task.id).await?;
            if self.store.delete_task(task.id).await? {
                removed += 1;
            }
        }

        info!(removed, "Historical task sweep finished");
        Ok(removed)
    }
}

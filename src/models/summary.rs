//! # Task Summaries
//!
//! Lightweight listing projection plus the filter/sort/pagination types
//! used by `get_task_summaries`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Task;
use crate::state_machine::TaskStatus;

/// Listing projection of a task, without the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub task_type: String,
    pub batch_id: Option<String>,
    pub external_reference: Option<String>,
    pub status: TaskStatus,
    pub step: Option<String>,
    pub execution_attempts: i32,
    pub queued: DateTime<Utc>,
    pub executed: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type.clone(),
            batch_id: task.batch_id.clone(),
            external_reference: task.external_reference.clone(),
            status: task.status,
            step: task.step.clone(),
            execution_attempts: task.execution_attempts,
            queued: task.queued,
            executed: task.executed,
            next_execution: task.next_execution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySortField {
    Queued,
    Type,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Filter, sort and page parameters for summary listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryQuery {
    /// Restrict to one task type code
    pub task_type: Option<String>,
    /// Restrict to one status
    pub status: Option<TaskStatus>,
    /// Case-insensitive substring match against id, external reference and
    /// batch id
    pub text: Option<String>,
    pub sort_field: SummarySortField,
    pub sort_direction: SortDirection,
    /// Zero-based page index
    pub page_index: u32,
    pub page_size: u32,
}

impl Default for SummaryQuery {
    fn default() -> Self {
        Self {
            task_type: None,
            status: None,
            text: None,
            sort_field: SummarySortField::Queued,
            sort_direction: SortDirection::Descending,
            page_index: 0,
            page_size: 50,
        }
    }
}

impl SummaryQuery {
    /// Row offset of the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page_index) * u64::from(self.page_size)
    }

    /// Whether a task passes the filter portion of the query.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(task_type) = &self.task_type {
            if &task.task_type != task_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let id_hit = task.id.to_string().to_lowercase().contains(&needle);
            let reference_hit = task
                .external_reference
                .as_deref()
                .is_some_and(|r| r.to_lowercase().contains(&needle));
            let batch_hit = task
                .batch_id
                .as_deref()
                .is_some_and(|b| b.to_lowercase().contains(&needle));
            if !(id_hit || reference_hit || batch_hit) {
                return false;
            }
        }
        true
    }
}

/// One page of results with the total match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page_index: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        ((self.total + u64::from(self.page_size) - 1) / u64::from(self.page_size)) as u32
    }

    pub fn has_next_page(&self) -> bool {
        u64::from(self.page_index + 1) * u64::from(self.page_size) < self.total
    }
}

//! # Data Model
//!
//! Durable records for the task execution engine: tasks, task types, audit
//! events, archived tasks, and the caller-facing request/summary types.
//!
//! Every mutation of a [`Task`] happens through the
//! [`crate::lifecycle::LifecycleController`]; these types carry no
//! transition logic of their own.

pub mod archived_task;
pub mod summary;
pub mod task;
pub mod task_event;
pub mod task_request;
pub mod task_type;

pub use archived_task::ArchivedTask;
pub use summary::{Page, SortDirection, SummaryQuery, SummarySortField, TaskSummary};
pub use task::{NewTask, Task};
pub use task_event::{TaskEvent, TaskEventType};
pub use task_request::QueueTaskRequest;
pub use task_type::{EventRecordingRule, NewTaskType, TaskType};

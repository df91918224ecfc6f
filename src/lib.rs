//! # Taskforge
//!
//! A persistent task execution engine: callers queue typed units of work,
//! a pool of workers claims and executes them through pluggable executors,
//! and a state machine governs every transition from `Queued` through
//! `Executing` to a terminal `Completed`, `Failed` or `Canceled`.
//!
//! ## Architecture
//!
//! - **Models** ([`models`]): tasks, task types, lifecycle events, archive
//!   records and summary projections.
//! - **State machine** ([`state_machine`]): the allowed-transition table;
//!   every status change in the engine goes through it.
//! - **Executors** ([`executor`]): the [`SimpleTaskExecutor`] and
//!   [`MultistepTaskExecutor`] traits plus the registry that binds executor
//!   ids to implementations. Outcomes are values ([`ExecutionVerdict`]),
//!   never exceptions.
//! - **Store** ([`store`]): the [`TaskStore`] trait with in-memory and
//!   PostgreSQL backends. Atomic claiming is the store's responsibility,
//!   so any number of workers and processes can share one store.
//! - **Lifecycle** ([`lifecycle`]): queueing, claiming, outcome
//!   application, cancel/suspend/unsuspend (single and batch) and
//!   hung-task recovery.
//! - **Workers** ([`worker`]): claim-execute loops and periodic sweeps.
//! - **Archiver** ([`archiver`]): relocates aged terminal tasks out of the
//!   active store.
//! - **Events** ([`events`]): best-effort in-process broadcast plus a
//!   per-type durable audit trail.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskforge::{
//!     EngineConfig, ExecutionVerdict, MemoryTaskStore, NewTaskType,
//!     QueueTaskRequest, SimpleTaskExecutor, Task, TaskEngine,
//! };
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl SimpleTaskExecutor for Greeter {
//!     async fn execute_task(&self, _task: &Task, data: &mut String) -> ExecutionVerdict {
//!         *data = format!("hello, {data}");
//!         ExecutionVerdict::success(true)
//!     }
//! }
//!
//! # async fn run() -> taskforge::Result<()> {
//! let engine = TaskEngine::new(Arc::new(MemoryTaskStore::new()), EngineConfig::default());
//! engine.register_simple_executor("greeter", Arc::new(Greeter));
//! engine
//!     .create_task_type(NewTaskType::new("greeting", "Greeting", "greeter"))
//!     .await?;
//! engine
//!     .queue_task(QueueTaskRequest::new("greeting", "world"))
//!     .await?;
//! let _pool = engine.start_workers("worker");
//! # Ok(())
//! # }
//! ```

pub mod archiver;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod state_machine;
pub mod store;
pub mod worker;

pub use archiver::Archiver;
pub use config::EngineConfig;
pub use engine::TaskEngine;
pub use error::{EngineError, Result, StoreError};
pub use events::{EventPublisher, EventRecorder, PublishedEvent};
pub use executor::{
    ExecutionVerdict, ExecutorRegistry, MultistepExecutorRef, MultistepTaskExecutor,
    SimpleExecutorRef, SimpleTaskExecutor, TaskStep,
};
pub use lifecycle::{ClaimedTask, LifecycleController};
pub use logging::init_structured_logging;
pub use models::{
    ArchivedTask, EventRecordingRule, NewTask, NewTaskType, Page, QueueTaskRequest,
    SortDirection, SummaryQuery, SummarySortField, Task, TaskEvent, TaskEventType, TaskSummary,
    TaskType,
};
pub use state_machine::{transition_allowed, TaskStatus};
pub use store::{AttemptUpdate, MemoryTaskStore, PgTaskStore, TaskStore};
pub use worker::{PoolHandle, TaskWorker, WorkerPool};

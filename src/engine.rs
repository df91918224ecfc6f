//! # Task Engine Facade
//!
//! Wires the store, executor registry, event system, lifecycle controller,
//! archiver and worker pool into one handle exposing the full caller
//! surface. Multiple engine instances (in one process or many) may share
//! one store; the store's atomic primitives keep them consistent.

use std::sync::Arc;
use uuid::Uuid;

use crate::archiver::Archiver;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{EventPublisher, EventRecorder};
use crate::executor::{ExecutorRegistry, MultistepExecutorRef, SimpleExecutorRef};
use crate::lifecycle::{ClaimedTask, LifecycleController};
use crate::models::{
    ArchivedTask, NewTaskType, Page, QueueTaskRequest, SummaryQuery, Task, TaskEvent,
    TaskSummary, TaskType,
};
use crate::state_machine::TaskStatus;
use crate::store::TaskStore;
use crate::worker::{PoolHandle, WorkerPool};

pub struct TaskEngine {
    config: EngineConfig,
    controller: Arc<LifecycleController>,
    archiver: Arc<Archiver>,
    publisher: EventPublisher,
}

impl TaskEngine {
    /// Build an engine over any store. Executors must be registered before
    /// task types referencing them can be created.
    pub fn new(store: Arc<dyn TaskStore>, config: EngineConfig) -> Self {
        let publisher = EventPublisher::new(config.event_channel_capacity);
        let registry = Arc::new(ExecutorRegistry::new());
        let recorder = EventRecorder::new(store.clone(), publisher.clone());
        let controller = Arc::new(LifecycleController::new(
            store.clone(),
            registry,
            recorder,
        ));
        let archiver = Arc::new(Archiver::new(
            store,
            config.retention_days,
            config.archive_batch_size,
        ));
        Self {
            config,
            controller,
            archiver,
            publisher,
        }
    }

    // --- wiring ---

    pub fn register_simple_executor(&self, id: impl Into<String>, executor: SimpleExecutorRef) {
        self.controller.registry().register_simple(id, executor);
    }

    pub fn register_multistep_executor(
        &self,
        id: impl Into<String>,
        executor: MultistepExecutorRef,
    ) {
        self.controller.registry().register_multistep(id, executor);
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    pub fn event_publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Spawn the configured worker loops and periodic sweeps.
    pub fn start_workers(&self, worker_prefix: &str) -> PoolHandle {
        WorkerPool::new(
            self.controller.clone(),
            self.archiver.clone(),
            self.config.clone(),
        )
        .spawn(worker_prefix)
    }

    // --- task types ---

    pub async fn create_task_type(&self, new_type: NewTaskType) -> Result<TaskType> {
        self.controller.create_task_type(new_type).await
    }

    pub async fn get_task_type(&self, code: &str) -> Result<TaskType> {
        self.controller.get_task_type(code).await
    }

    // --- tasks ---

    pub async fn queue_task(&self, request: QueueTaskRequest) -> Result<Uuid> {
        self.controller.queue_task(request).await
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Task> {
        self.controller.get_task(id).await
    }

    pub async fn get_task_by_external_reference(&self, reference: &str) -> Result<Task> {
        self.controller.get_task_by_external_reference(reference).await
    }

    pub async fn get_task_summaries(&self, query: &SummaryQuery) -> Result<Page<TaskSummary>> {
        self.controller.get_task_summaries(query).await
    }

    pub async fn get_task_events_for_task(&self, id: Uuid) -> Result<Vec<TaskEvent>> {
        self.controller.get_task_events_for_task(id).await
    }

    pub async fn claim_next_task(&self, worker_id: &str) -> Result<Option<ClaimedTask>> {
        self.controller.claim_next_task(worker_id).await
    }

    pub async fn cancel_task(&self, id: Uuid) -> Result<()> {
        self.controller.cancel_task(id).await
    }

    pub async fn suspend_task(&self, id: Uuid) -> Result<()> {
        self.controller.suspend_task(id).await
    }

    pub async fn unsuspend_task(&self, id: Uuid) -> Result<()> {
        self.controller.unsuspend_task(id).await
    }

    pub async fn cancel_batch(&self, batch_id: &str) -> Result<usize> {
        self.controller.cancel_batch(batch_id).await
    }

    pub async fn suspend_batch(&self, batch_id: &str) -> Result<usize> {
        self.controller.suspend_batch(batch_id).await
    }

    pub async fn unsuspend_batch(&self, batch_id: &str) -> Result<usize> {
        self.controller.unsuspend_batch(batch_id).await
    }

    pub async fn reset_hung_tasks(&self) -> Result<usize> {
        self.controller.reset_hung_tasks().await
    }

    // --- archive ---

    pub fn set_historical_task_retention_days(&self, days: i64) {
        self.archiver.set_retention_days(days);
    }

    pub async fn archive_and_delete_historical_tasks(&self) -> Result<usize> {
        self.archiver.archive_and_delete_historical_tasks().await
    }

    pub async fn get_archived_task(&self, id: Uuid) -> Result<ArchivedTask> {
        self.archiver.get_archived_task(id).await
    }

    /// Current status of a task, for monitoring convenience.
    pub async fn get_task_status(&self, id: Uuid) -> Result<TaskStatus> {
        Ok(self.controller.get_task(id).await?.status)
    }
}

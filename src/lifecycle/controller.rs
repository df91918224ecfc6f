//! # Lifecycle Controller
//!
//! Drives the task state machine. Every transition goes through the
//! store's atomic primitives, so any number of controller instances may
//! run against the same store; the controller itself keeps no mutable
//! state.
//!
//! ## Outcome application
//!
//! The outcome table lives in one place ([`LifecycleController::apply_execution_result`]):
//! success completes the task (or advances a multistep task to its next
//! declared step), a fatal verdict fails it, a retry verdict re-queues it
//! with the type's retry delay until the attempt budget is exhausted, and
//! a delay verdict re-queues it without consuming a retry attempt.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::events::EventRecorder;
use crate::executor::{ExecutionVerdict, ExecutorKind, ExecutorRegistry, TaskStep};
use crate::models::{
    NewTask, NewTaskType, Page, QueueTaskRequest, SummaryQuery, Task, TaskEvent, TaskEventType,
    TaskSummary, TaskType,
};
use crate::state_machine::TaskStatus;
use crate::store::{AttemptUpdate, TaskStore};

/// A claimed task bundled with its type so the worker does not re-read it.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub task: Task,
    pub task_type: TaskType,
}

pub struct LifecycleController {
    store: Arc<dyn TaskStore>,
    registry: Arc<ExecutorRegistry>,
    recorder: EventRecorder,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<ExecutorRegistry>,
        recorder: EventRecorder,
    ) -> Self {
        Self {
            store,
            registry,
            recorder,
        }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    // --- task types ---

    /// Validate and persist a new task type. The executor id must already
    /// be registered, so an unresolvable mapping is rejected here rather
    /// than at dispatch time.
    pub async fn create_task_type(&self, new_type: NewTaskType) -> Result<TaskType> {
        if new_type.code.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "task type code must not be empty".to_string(),
            ));
        }
        if new_type.name.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "task type name must not be empty".to_string(),
            ));
        }
        if new_type.maximum_execution_attempts < 1 {
            return Err(EngineError::InvalidArgument(
                "maximum_execution_attempts must be at least 1".to_string(),
            ));
        }
        if new_type.retry_delay_ms < 0 || new_type.execution_timeout_ms <= 0 {
            return Err(EngineError::InvalidArgument(
                "retry_delay_ms must be non-negative and execution_timeout_ms positive"
                    .to_string(),
            ));
        }
        if !self.registry.contains(&new_type.executor) {
            return Err(EngineError::TaskTypeNotFound(format!(
                "executor '{}' is not registered for task type '{}'",
                new_type.executor, new_type.code
            )));
        }
        if self.store.find_task_type(&new_type.code).await?.is_some() {
            return Err(EngineError::InvalidArgument(format!(
                "task type '{}' already exists",
                new_type.code
            )));
        }

        let task_type = new_type.into_task_type();
        self.store.insert_task_type(task_type.clone()).await?;
        info!(code = %task_type.code, executor = %task_type.executor, "Task type created");
        Ok(task_type)
    }

    pub async fn get_task_type(&self, code: &str) -> Result<TaskType> {
        self.store
            .find_task_type(code)
            .await?
            .ok_or_else(|| EngineError::TaskTypeNotFound(code.to_string()))
    }

    // --- queueing and lookup ---

    /// Validate a queue request and insert the task in `Queued` (or
    /// `Suspended` when requested). Returns the new task id.
    #[instrument(skip(self, request), fields(task_type = %request.task_type))]
    pub async fn queue_task(&self, request: QueueTaskRequest) -> Result<Uuid> {
        if request.task_type.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "task type must not be empty".to_string(),
            ));
        }
        if request.data.is_empty() {
            return Err(EngineError::InvalidArgument(
                "task data must not be empty".to_string(),
            ));
        }
        let task_type = self
            .store
            .find_task_type(&request.task_type)
            .await?
            .ok_or_else(|| EngineError::TaskTypeNotFound(request.task_type.clone()))?;
        if !task_type.enabled {
            return Err(EngineError::InvalidArgument(format!(
                "task type '{}' is disabled",
                task_type.code
            )));
        }
        if let Some(reference) = &request.external_reference {
            if self.store.external_reference_exists(reference).await? {
                return Err(EngineError::InvalidArgument(format!(
                    "external reference '{reference}' already exists"
                )));
            }
        }

        let task = NewTask {
            task_type: request.task_type,
            batch_id: request.batch_id,
            external_reference: request.external_reference,
            data: request.data,
            priority: task_type.priority,
            suspended: request.suspended,
        }
        .into_task(Utc::now());

        let task_id = task.id;
        let status = task.status;
        self.store.insert_task(task).await?;
        info!(task_id = %task_id, status = %status, "Task queued");
        Ok(task_id)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Task> {
        self.store
            .find_task(id)
            .await?
            .ok_or(EngineError::TaskNotFound(id))
    }

    pub async fn get_task_by_external_reference(&self, reference: &str) -> Result<Task> {
        self.store
            .find_task_by_external_reference(reference)
            .await?
            .ok_or_else(|| EngineError::TaskReferenceNotFound(reference.to_string()))
    }

    pub async fn get_task_summaries(&self, query: &SummaryQuery) -> Result<Page<TaskSummary>> {
        Ok(self.store.find_task_summaries(query).await?)
    }

    pub async fn get_task_events_for_task(&self, id: Uuid) -> Result<Vec<TaskEvent>> {
        // Surface not-found instead of an empty trail for unknown ids.
        let _ = self.get_task(id).await?;
        Ok(self.store.find_events_for_task(id).await?)
    }

    // --- claiming and outcome application ---

    /// Atomically claim the next eligible task for `worker_id`. Returns
    /// `None` rather than blocking when nothing is claimable.
    #[instrument(skip(self), fields(worker_id = %worker_id))]
    pub async fn claim_next_task(&self, worker_id: &str) -> Result<Option<ClaimedTask>> {
        let Some(mut task) = self.store.claim_next_task(worker_id, Utc::now()).await? else {
            return Ok(None);
        };
        let task_type = self
            .store
            .find_task_type(&task.task_type)
            .await?
            .ok_or_else(|| {
                EngineError::ServiceUnavailable(format!(
                    "task {} references unknown task type '{}'",
                    task.id, task.task_type
                ))
            })?;

        // A fresh multistep task starts at the first declared step.
        if task.step.is_none() {
            if let Some(ExecutorKind::Multistep(executor)) =
                self.registry.resolve(&task_type.executor)
            {
                task.step = executor.steps().first().map(|s| s.name.clone());
            }
        }

        debug!(
            task_id = %task.id,
            attempt = task.execution_attempts,
            step = task.step.as_deref(),
            "Task claimed"
        );
        Ok(Some(ClaimedTask { task, task_type }))
    }

    /// Apply an execution attempt's verdict and return the task's resulting
    /// status. If the task was canceled while the attempt was in flight the
    /// outcome is dropped and `Canceled` is returned.
    #[instrument(skip(self, claimed, data, verdict), fields(task_id = %claimed.task.id))]
    pub async fn apply_execution_result(
        &self,
        claimed: &ClaimedTask,
        data: String,
        verdict: ExecutionVerdict,
    ) -> Result<TaskStatus> {
        let task = &claimed.task;
        let task_type = &claimed.task_type;
        let worker_id = task.lock_name.clone().ok_or_else(|| {
            EngineError::InvalidArgument(format!("task {} holds no claim lock", task.id))
        })?;

        let steps = self.multistep_sequence(task_type);
        let disposition = self.decide(task, task_type, steps.as_deref(), &verdict);

        let update = AttemptUpdate {
            task_id: task.id,
            worker_id,
            status: disposition.status,
            step: disposition.step.clone(),
            data,
            next_execution: disposition.next_execution,
            rewind_attempt: disposition.rewind_attempt,
        };
        let Some(updated) = self.store.complete_attempt(update).await? else {
            // Lost the row to a concurrent cancel; the outcome is dropped.
            let current = self.store.find_task(task.id).await?;
            let status = current.map_or(TaskStatus::Canceled, |t| t.status);
            info!(task_id = %task.id, status = %status, "Attempt outcome dropped");
            return Ok(status);
        };

        if let Some((event_type, event_step)) = disposition.event {
            let mut snapshot = updated.clone();
            snapshot.step = event_step;
            self.recorder.record(&snapshot, task_type, event_type).await?;
        }

        match &verdict {
            ExecutionVerdict::Failed { reason } | ExecutionVerdict::Retry { reason } => {
                warn!(
                    task_id = %task.id,
                    status = %updated.status,
                    attempt = updated.execution_attempts,
                    reason = %reason,
                    "Execution attempt failed"
                );
            }
            _ => {
                debug!(
                    task_id = %task.id,
                    status = %updated.status,
                    step = updated.step.as_deref(),
                    "Execution attempt applied"
                );
            }
        }
        Ok(updated.status)
    }

    fn multistep_sequence(&self, task_type: &TaskType) -> Option<Vec<TaskStep>> {
        match self.registry.resolve(&task_type.executor) {
            Some(ExecutorKind::Multistep(executor)) => Some(executor.steps().to_vec()),
            _ => None,
        }
    }

    /// Pure decision table mapping a verdict to the post-attempt row state.
    fn decide(
        &self,
        task: &Task,
        task_type: &TaskType,
        steps: Option<&[TaskStep]>,
        verdict: &ExecutionVerdict,
    ) -> Disposition {
        let now = Utc::now();
        match verdict {
            ExecutionVerdict::Success { finished, .. } => {
                let Some(steps) = steps else {
                    return Disposition::terminal(
                        TaskStatus::Completed,
                        task.step.clone(),
                        Some((TaskEventType::TaskCompleted, task.step.clone())),
                    );
                };
                let current_index = task
                    .step
                    .as_deref()
                    .and_then(|name| steps.iter().position(|s| s.name == name))
                    .unwrap_or(0);
                let current_name = steps
                    .get(current_index)
                    .map(|s| s.name.clone())
                    .or_else(|| task.step.clone());
                let is_last = current_index + 1 >= steps.len();
                if *finished || is_last {
                    return Disposition::terminal(
                        TaskStatus::Completed,
                        current_name.clone(),
                        Some((TaskEventType::TaskCompleted, current_name)),
                    );
                }
                let next = &steps[current_index + 1];
                let next_execution = (next.delay_ms > 0)
                    .then(|| now + Duration::milliseconds(next.delay_ms));
                Disposition {
                    status: TaskStatus::Queued,
                    step: Some(next.name.clone()),
                    next_execution,
                    rewind_attempt: false,
                    event: Some((TaskEventType::StepCompleted, current_name)),
                }
            }
            ExecutionVerdict::Failed { .. } => Disposition::terminal(
                TaskStatus::Failed,
                task.step.clone(),
                Some((TaskEventType::TaskFailed, task.step.clone())),
            ),
            ExecutionVerdict::Retry { .. } => {
                if task.execution_attempts < task_type.maximum_execution_attempts {
                    Disposition {
                        status: TaskStatus::Queued,
                        step: task.step.clone(),
                        next_execution: Some(
                            now + Duration::milliseconds(task_type.retry_delay_ms),
                        ),
                        rewind_attempt: false,
                        event: Some((TaskEventType::TaskRetryScheduled, task.step.clone())),
                    }
                } else {
                    Disposition::terminal(
                        TaskStatus::Failed,
                        task.step.clone(),
                        Some((TaskEventType::TaskFailed, task.step.clone())),
                    )
                }
            }
            // A delay is not a failure: hand back the claim's attempt
            // increment so the retry budget is untouched.
            ExecutionVerdict::Delayed { delay_ms } => Disposition {
                status: TaskStatus::Queued,
                step: task.step.clone(),
                next_execution: Some(now + Duration::milliseconds((*delay_ms).max(0))),
                rewind_attempt: true,
                event: Some((TaskEventType::TaskDelayed, task.step.clone())),
            },
        }
    }

    // --- cancel / suspend / unsuspend ---

    pub async fn cancel_task(&self, id: Uuid) -> Result<()> {
        let task = self.get_task(id).await?;
        match task.status {
            TaskStatus::Canceled => Ok(()), // idempotent
            TaskStatus::Completed | TaskStatus::Failed => Err(self.immutable(&task, "cancel")),
            _ => {
                let updated = self
                    .store
                    .transition_status(
                        id,
                        &[TaskStatus::Queued, TaskStatus::Executing, TaskStatus::Suspended],
                        TaskStatus::Canceled,
                    )
                    .await?;
                match updated {
                    Some(task) => {
                        let task_type = self.get_task_type(&task.task_type).await?;
                        self.recorder
                            .record(&task, &task_type, TaskEventType::TaskCanceled)
                            .await?;
                        info!(task_id = %id, "Task canceled");
                        Ok(())
                    }
                    None => self.settle_race(id, TaskStatus::Canceled, "cancel").await,
                }
            }
        }
    }

    pub async fn suspend_task(&self, id: Uuid) -> Result<()> {
        let task = self.get_task(id).await?;
        match task.status {
            TaskStatus::Suspended => Ok(()), // idempotent
            status if status.is_terminal() => Err(self.immutable(&task, "suspend")),
            _ => {
                let updated = self
                    .store
                    .transition_status(
                        id,
                        &[TaskStatus::Queued, TaskStatus::Executing],
                        TaskStatus::Suspended,
                    )
                    .await?;
                match updated {
                    Some(task) => {
                        let task_type = self.get_task_type(&task.task_type).await?;
                        self.recorder
                            .record(&task, &task_type, TaskEventType::TaskSuspended)
                            .await?;
                        info!(task_id = %id, "Task suspended");
                        Ok(())
                    }
                    None => self.settle_race(id, TaskStatus::Suspended, "suspend").await,
                }
            }
        }
    }

    /// Return a suspended task to the claim pool immediately (no delay).
    pub async fn unsuspend_task(&self, id: Uuid) -> Result<()> {
        let task = self.get_task(id).await?;
        match task.status {
            TaskStatus::Queued | TaskStatus::Executing => Ok(()), // nothing to resume
            status if status.is_terminal() => Err(self.immutable(&task, "unsuspend")),
            _ => {
                let updated = self
                    .store
                    .transition_status(id, &[TaskStatus::Suspended], TaskStatus::Queued)
                    .await?;
                match updated {
                    Some(task) => {
                        let task_type = self.get_task_type(&task.task_type).await?;
                        self.recorder
                            .record(&task, &task_type, TaskEventType::TaskUnsuspended)
                            .await?;
                        info!(task_id = %id, "Task unsuspended");
                        Ok(())
                    }
                    None => self.settle_race(id, TaskStatus::Queued, "unsuspend").await,
                }
            }
        }
    }

    pub async fn cancel_batch(&self, batch_id: &str) -> Result<usize> {
        let transitioned = self
            .store
            .transition_batch(
                batch_id,
                &[TaskStatus::Queued, TaskStatus::Executing, TaskStatus::Suspended],
                TaskStatus::Canceled,
            )
            .await?;
        self.record_batch(&transitioned, TaskEventType::TaskCanceled)
            .await?;
        info!(batch_id = %batch_id, count = transitioned.len(), "Batch canceled");
        Ok(transitioned.len())
    }

    pub async fn suspend_batch(&self, batch_id: &str) -> Result<usize> {
        let transitioned = self
            .store
            .transition_batch(
                batch_id,
                &[TaskStatus::Queued, TaskStatus::Executing],
                TaskStatus::Suspended,
            )
            .await?;
        self.record_batch(&transitioned, TaskEventType::TaskSuspended)
            .await?;
        info!(batch_id = %batch_id, count = transitioned.len(), "Batch suspended");
        Ok(transitioned.len())
    }

    pub async fn unsuspend_batch(&self, batch_id: &str) -> Result<usize> {
        let transitioned = self
            .store
            .transition_batch(batch_id, &[TaskStatus::Suspended], TaskStatus::Queued)
            .await?;
        self.record_batch(&transitioned, TaskEventType::TaskUnsuspended)
            .await?;
        info!(batch_id = %batch_id, count = transitioned.len(), "Batch unsuspended");
        Ok(transitioned.len())
    }

    // --- hung-task recovery ---

    /// Return tasks stuck `Executing` past their type's timeout to the
    /// claim pool, unlocked and without touching the attempt counter.
    /// Compensates for workers that crashed while holding a claim.
    pub async fn reset_hung_tasks(&self) -> Result<usize> {
        let hung = self.store.find_hung_tasks(Utc::now()).await?;
        let mut types: HashMap<String, TaskType> = HashMap::new();
        let mut reset = 0usize;
        for task in hung {
            let (Some(lock_name), Some(executed)) = (task.lock_name.clone(), task.executed)
            else {
                continue;
            };
            if !self.store.reset_task(task.id, &lock_name, executed).await? {
                continue; // the worker finished or another sweep won
            }
            reset += 1;
            warn!(
                task_id = %task.id,
                stale_lock = %lock_name,
                "Hung task returned to queue"
            );
            let task_type = match types.get(&task.task_type) {
                Some(t) => t.clone(),
                None => {
                    let t = self.get_task_type(&task.task_type).await?;
                    types.insert(task.task_type.clone(), t.clone());
                    t
                }
            };
            let mut requeued = task.clone();
            requeued.status = TaskStatus::Queued;
            requeued.lock_name = None;
            self.recorder
                .record(&requeued, &task_type, TaskEventType::TaskReset)
                .await?;
        }
        Ok(reset)
    }

    // --- helpers ---

    fn immutable(&self, task: &Task, operation: &'static str) -> EngineError {
        EngineError::InvalidTaskStatus {
            task_id: task.id,
            status: task.status.to_string(),
            operation,
        }
    }

    /// A compare-and-set transition lost a race; decide how the operation
    /// ends by looking at where the row settled.
    async fn settle_race(
        &self,
        id: Uuid,
        wanted: TaskStatus,
        operation: &'static str,
    ) -> Result<()> {
        let task = self.get_task(id).await?;
        if task.status == wanted {
            return Ok(());
        }
        Err(EngineError::InvalidTaskStatus {
            task_id: id,
            status: task.status.to_string(),
            operation,
        })
    }

    async fn record_batch(&self, tasks: &[Task], event_type: TaskEventType) -> Result<()> {
        let mut types: HashMap<String, TaskType> = HashMap::new();
        for task in tasks {
            let task_type = match types.get(&task.task_type) {
                Some(t) => t.clone(),
                None => {
                    let t = self.get_task_type(&task.task_type).await?;
                    types.insert(task.task_type.clone(), t.clone());
                    t
                }
            };
            self.recorder.record(task, &task_type, event_type).await?;
        }
        Ok(())
    }
}

/// Post-attempt row state decided from a verdict.
struct Disposition {
    status: TaskStatus,
    step: Option<String>,
    next_execution: Option<chrono::DateTime<Utc>>,
    rewind_attempt: bool,
    event: Option<(TaskEventType, Option<String>)>,
}

impl Disposition {
    fn terminal(
        status: TaskStatus,
        step: Option<String>,
        event: Option<(TaskEventType, Option<String>)>,
    ) -> Self {
        Self {
            status,
            step,
            next_execution: None,
            rewind_attempt: false,
            event,
        }
    }
}

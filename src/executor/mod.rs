//! # Executors
//!
//! Pluggable task execution implementations and the registry that resolves
//! them. Two capability variants share one contract: given a task and its
//! opaque data, report a verdict.
//!
//! ## Outcome model
//!
//! Fail/retry/delay are ordinary enum variants returned from the call, not
//! errors, so the success path and the three failure paths are equally
//! visible and exhaustively matched by the lifecycle controller.
//!
//! ## Multistep sequencing
//!
//! A multistep executor declares its ordered [`TaskStep`] list at
//! construction and only ever reports on the *current* step; the controller
//! owns advancing the task through the sequence.

pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::Task;

pub use registry::{ExecutorKind, ExecutorRegistry};

/// One stage of a multistep executor's ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStep {
    /// Stable identifier stored on the task while the step is active
    pub name: String,
    /// Human-readable label for operators
    pub label: String,
    /// Wait before this step may run after being reached; `0` runs
    /// immediately
    pub delay_ms: i64,
}

impl TaskStep {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            delay_ms: 0,
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: i64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// Verdict of one execution attempt, reported by either executor variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionVerdict {
    /// The attempt succeeded.
    ///
    /// For a simple executor this completes the task; `finished` is ignored.
    /// For a multistep executor `finished = true` marks the task complete
    /// even if later steps remain declared, and `finished = false` hands
    /// control back to the controller to advance to the next step.
    /// `data_changed` signals that the executor mutated the payload.
    Success { finished: bool, data_changed: bool },
    /// Fatal failure; the task is failed regardless of remaining attempts.
    Failed { reason: String },
    /// Transient failure; re-queue with the type's retry delay while the
    /// attempt budget lasts.
    Retry { reason: String },
    /// Not ready yet; re-queue after `delay_ms` without consuming a retry
    /// attempt.
    Delayed { delay_ms: i64 },
}

impl ExecutionVerdict {
    /// Convenience constructor for a completed single-step attempt.
    pub fn success(data_changed: bool) -> Self {
        Self::Success {
            finished: true,
            data_changed,
        }
    }

    /// Convenience constructor for a non-final multistep success.
    pub fn step_done(data_changed: bool) -> Self {
        Self::Success {
            finished: false,
            data_changed,
        }
    }
}

/// Single-call executor: one attempt runs the whole task.
#[async_trait]
pub trait SimpleTaskExecutor: Send + Sync {
    /// Run the task. `data` may be mutated; the engine persists the final
    /// value either way.
    async fn execute_task(&self, task: &Task, data: &mut String) -> ExecutionVerdict;
}

/// Step-wise executor with an ordered, immutable step sequence.
#[async_trait]
pub trait MultistepTaskExecutor: Send + Sync {
    /// The declared step sequence. Must be non-empty and stable for the
    /// lifetime of the executor.
    fn steps(&self) -> &[TaskStep];

    /// Run one step of the task.
    async fn execute_task_step(
        &self,
        task: &Task,
        step: &TaskStep,
        data: &mut String,
    ) -> ExecutionVerdict;
}

/// Shared handle aliases used by the registry and worker.
pub type SimpleExecutorRef = Arc<dyn SimpleTaskExecutor>;
pub type MultistepExecutorRef = Arc<dyn MultistepTaskExecutor>;

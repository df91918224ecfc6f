//! # Engine Error Types
//!
//! Structured error handling for the task execution engine using thiserror
//! instead of `Box<dyn Error>` patterns.
//!
//! The taxonomy mirrors the caller-facing contract: validation errors,
//! not-found errors, illegal-transition errors, and infrastructure errors.
//! Executor outcomes (fail/retry/delay) are *not* errors; they are modeled
//! as [`crate::executor::ExecutionVerdict`] variants and drive state
//! transitions only.

use thiserror::Error;
use uuid::Uuid;

/// Caller-facing engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad or missing request fields. Rejected synchronously, never persisted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("task not found for external reference: {0}")]
    TaskReferenceNotFound(String),

    #[error("task type not found: {0}")]
    TaskTypeNotFound(String),

    #[error("archived task not found: {0}")]
    ArchivedTaskNotFound(Uuid),

    /// An operation with no terminal-state meaning was attempted on a
    /// terminal task (e.g. canceling a completed task).
    #[error("invalid task status: task {task_id} is {status}: {operation} not allowed")]
    InvalidTaskStatus {
        task_id: Uuid,
        status: String,
        operation: &'static str,
    },

    /// Store or other infrastructure failure. The only class a caller is
    /// expected to retry.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Errors surfaced by a [`crate::store::TaskStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Unique-key conflict on insert (task id or task type code).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => EngineError::ServiceUnavailable(format!("conflict: {msg}")),
            StoreError::Backend(msg) => EngineError::ServiceUnavailable(msg),
            StoreError::Serialization(e) => EngineError::ServiceUnavailable(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

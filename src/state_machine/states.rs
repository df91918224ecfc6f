use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status definitions for the execution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the claim pool (possibly until `next_execution`)
    Queued,
    /// Claimed by a worker and currently running
    Executing,
    /// Withheld from the claim pool by an operator
    Suspended,
    /// Finished successfully
    Completed,
    /// Failed fatally or exhausted its retry budget
    Failed,
    /// Canceled by an operator before reaching a natural end
    Canceled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        Self::Queued,
        Self::Executing,
        Self::Suspended,
        Self::Completed,
        Self::Failed,
        Self::Canceled,
    ];

    /// Check if this is a terminal state (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Check if this is an active state (a worker currently holds the task).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Executing)
    }

    /// Terminal states that are immutable to operator commands. Canceled is
    /// terminal too, but re-canceling it is an idempotent no-op.
    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Executing => write!(f, "executing"),
            Self::Suspended => write!(f, "suspended"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "executing" => Ok(Self::Executing),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

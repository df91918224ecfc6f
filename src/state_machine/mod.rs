//! # Task State Machine
//!
//! State definitions and the legal-transition table for the task lifecycle.
//!
//! The [`crate::lifecycle::LifecycleController`] drives all transitions;
//! this module only answers "which states exist" and "is this edge legal".

pub mod states;

pub use states::TaskStatus;

/// Check whether a direct transition between two statuses is legal.
///
/// The table covers every edge the controller can produce: claiming,
/// outcome application, cancel/suspend/unsuspend, and the hung-task reset.
/// Terminal states have no outgoing edges.
pub fn transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        // Claiming and outcome application
        (Queued, Executing)
            | (Executing, Completed)
            | (Executing, Failed)
            | (Executing, Queued)     // retry, delay, step advance, hung reset
            | (Executing, Suspended)  // suspend requested mid-attempt
            // Cancel from any non-terminal state
            | (Queued, Canceled)
            | (Executing, Canceled)
            | (Suspended, Canceled)
            // Suspend and resume
            | (Queued, Suspended)
            | (Suspended, Queued)
    )
}

//! # Task Lifecycle
//!
//! The [`LifecycleController`] is the only component that mutates tasks:
//! it validates and queues new work, claims the next eligible task for a
//! worker, applies execution outcomes (success, step advance, fatal
//! failure, retry, delay), runs the cancel/suspend/unsuspend operations on
//! single tasks and batches, and sweeps hung tasks back into the pool.

pub mod controller;

pub use controller::{ClaimedTask, LifecycleController};

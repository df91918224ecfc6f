//! # Executor Registry
//!
//! Static registry mapping executor ids to compiled implementations,
//! populated at startup. Task type creation validates its executor id
//! against this registry, so an unknown mapping is rejected before any
//! task of that type can be queued rather than at dispatch time.

use dashmap::DashMap;
use tracing::debug;

use crate::executor::{MultistepExecutorRef, SimpleExecutorRef};

/// Resolved executor handle for one task type.
#[derive(Clone)]
pub enum ExecutorKind {
    Simple(SimpleExecutorRef),
    Multistep(MultistepExecutorRef),
}

impl ExecutorKind {
    pub fn is_multistep(&self) -> bool {
        matches!(self, Self::Multistep(_))
    }
}

/// Concurrent id-to-executor catalog.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<String, ExecutorKind>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single-call executor under `id`, replacing any previous
    /// registration.
    pub fn register_simple(&self, id: impl Into<String>, executor: SimpleExecutorRef) {
        let id = id.into();
        debug!(executor_id = %id, kind = "simple", "Registering executor");
        self.executors.insert(id, ExecutorKind::Simple(executor));
    }

    /// Register a multistep executor under `id`, replacing any previous
    /// registration.
    pub fn register_multistep(&self, id: impl Into<String>, executor: MultistepExecutorRef) {
        let id = id.into();
        debug!(executor_id = %id, kind = "multistep", "Registering executor");
        self.executors.insert(id, ExecutorKind::Multistep(executor));
    }

    /// Resolve an executor id to its implementation.
    pub fn resolve(&self, id: &str) -> Option<ExecutorKind> {
        self.executors.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.executors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

//! # Event Recorder
//!
//! Appends lifecycle events to the task's durable audit trail, governed by
//! the task type's [`crate::models::EventRecordingRule`]s, and mirrors
//! every event onto the in-process broadcast channel.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::events::EventPublisher;
use crate::models::{Task, TaskEvent, TaskEventType, TaskType};
use crate::store::TaskStore;

pub struct EventRecorder {
    store: Arc<dyn TaskStore>,
    publisher: EventPublisher,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn TaskStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Record one lifecycle event for `task`.
    ///
    /// The broadcast copy always goes out; the durable copy is appended
    /// only when the task's type opts in, with a data snapshot when the
    /// rule requests one.
    pub async fn record(
        &self,
        task: &Task,
        task_type: &TaskType,
        event_type: TaskEventType,
    ) -> Result<()> {
        self.publisher
            .publish(task.id, &task.task_type, event_type, task.step.clone());

        let Some(rule) = task_type.recording_rule(event_type) else {
            return Ok(());
        };
        let snapshot = rule.with_task_data.then(|| task.data.clone());
        let event = TaskEvent::new(task.id, event_type, task.step.clone(), snapshot);
        debug!(
            task_id = %task.id,
            event_type = %event_type,
            step = task.step.as_deref(),
            "Recording task event"
        );
        self.store.append_event(event).await?;
        Ok(())
    }
}

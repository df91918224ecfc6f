//! In-process broadcast of lifecycle events.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::TaskEventType;

/// High-throughput broadcast publisher for lifecycle events.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event delivered to in-process subscribers.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub task_id: Uuid,
    pub task_type: String,
    pub event_type: TaskEventType,
    pub task_step: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a lifecycle event. A channel without subscribers is not an
    /// error; the event is simply not observed.
    pub fn publish(
        &self,
        task_id: Uuid,
        task_type: impl Into<String>,
        event_type: TaskEventType,
        task_step: Option<String>,
    ) {
        let event = PublishedEvent {
            task_id,
            task_type: task_type.into(),
            event_type,
            task_step,
            published_at: Utc::now(),
        };
        // send() fails only when no receiver exists, which is acceptable.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

//! Archival sweeps, per-type archive flags and the event pipeline.

mod common;

use common::{harness, quick_type, record, ScriptedExecutor};
use taskforge::{
    EngineError, EventRecordingRule, QueueTaskRequest, TaskEventType, TaskStatus, TaskStore,
};

#[tokio::test]
async fn test_completed_task_archives_with_its_event_log() {
    let h = harness();
    h.engine
        .register_simple_executor("noop", ScriptedExecutor::appending("+done"));
    let mut new_type = quick_type("mail_job", "noop");
    new_type.recorded_events = vec![EventRecordingRule {
        event_type: TaskEventType::TaskCompleted,
        with_task_data: true,
    }];
    h.engine.create_task_type(new_type).await.unwrap();

    let task_id = h
        .engine
        .queue_task(
            QueueTaskRequest::new("mail_job", "payload")
                .with_batch_id("nightly")
                .with_external_reference("order-9"),
        )
        .await
        .unwrap();
    h.drain().await;

    h.engine.set_historical_task_retention_days(0);
    assert_eq!(
        h.engine.archive_and_delete_historical_tasks().await.unwrap(),
        1
    );

    // Gone from the active store, present in the archive.
    assert!(matches!(
        h.engine.get_task(task_id).await,
        Err(EngineError::TaskNotFound(_))
    ));
    let archived = h.engine.get_archived_task(task_id).await.unwrap();
    assert_eq!(archived.id, task_id);
    assert_eq!(archived.task_type, "mail_job");
    assert_eq!(archived.batch_id.as_deref(), Some("nightly"));
    assert_eq!(archived.external_reference.as_deref(), Some("order-9"));
    assert_eq!(archived.status, TaskStatus::Completed);
    assert_eq!(archived.data, "payload+done");
    assert_eq!(archived.execution_attempts, 1);
    assert_eq!(archived.event_log.len(), 1);
    assert_eq!(archived.event_log[0].event_type, TaskEventType::TaskCompleted);
    assert_eq!(archived.event_log[0].task_data.as_deref(), Some("payload+done"));

    // The active event trail was cleaned up with the task.
    assert!(h.store.find_events_for_task(task_id).await.unwrap().is_empty());

    // Re-running the sweep finds nothing.
    assert_eq!(
        h.engine.archive_and_delete_historical_tasks().await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_type_without_archiving_deletes_outright() {
    let h = harness();
    h.engine
        .register_simple_executor("noop", ScriptedExecutor::completing());
    let mut new_type = quick_type("ephemeral_job", "noop");
    new_type.archive_completed = false;
    h.engine.create_task_type(new_type).await.unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("ephemeral_job", "{}"))
        .await
        .unwrap();
    h.drain().await;

    h.engine.set_historical_task_retention_days(0);
    assert_eq!(
        h.engine.archive_and_delete_historical_tasks().await.unwrap(),
        1
    );
    assert!(matches!(
        h.engine.get_task(task_id).await,
        Err(EngineError::TaskNotFound(_))
    ));
    assert!(matches!(
        h.engine.get_archived_task(task_id).await,
        Err(EngineError::ArchivedTaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_failed_tasks_follow_their_own_archive_flag() {
    let h = harness();
    h.engine.register_simple_executor(
        "failing",
        ScriptedExecutor::with_script(vec![taskforge::ExecutionVerdict::Failed {
            reason: "broken".to_string(),
        }]),
    );
    let mut new_type = quick_type("failing_job", "failing");
    new_type.archive_completed = false;
    new_type.archive_failed = true;
    h.engine.create_task_type(new_type).await.unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("failing_job", "{}"))
        .await
        .unwrap();
    h.drain().await;

    h.engine.set_historical_task_retention_days(0);
    h.engine.archive_and_delete_historical_tasks().await.unwrap();

    let archived = h.engine.get_archived_task(task_id).await.unwrap();
    assert_eq!(archived.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_sweep_ignores_canceled_and_pending_tasks() {
    let h = harness();
    h.engine
        .register_simple_executor("noop", ScriptedExecutor::completing());
    h.engine
        .create_task_type(quick_type("mail_job", "noop"))
        .await
        .unwrap();

    let canceled = h
        .engine
        .queue_task(QueueTaskRequest::new("mail_job", "{}"))
        .await
        .unwrap();
    h.engine.cancel_task(canceled).await.unwrap();
    let queued = h
        .engine
        .queue_task(QueueTaskRequest::new("mail_job", "{}").suspended())
        .await
        .unwrap();

    h.engine.set_historical_task_retention_days(0);
    assert_eq!(
        h.engine.archive_and_delete_historical_tasks().await.unwrap(),
        0
    );
    assert!(h.engine.get_task(canceled).await.is_ok());
    assert!(h.engine.get_task(queued).await.is_ok());
}

#[tokio::test]
async fn test_retention_window_keeps_recent_tasks() {
    let h = harness();
    h.engine
        .register_simple_executor("noop", ScriptedExecutor::completing());
    h.engine
        .create_task_type(quick_type("mail_job", "noop"))
        .await
        .unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("mail_job", "{}"))
        .await
        .unwrap();
    h.drain().await;

    // Default retention is 30 days; a just-finished task stays put.
    assert_eq!(
        h.engine.archive_and_delete_historical_tasks().await.unwrap(),
        0
    );
    assert!(h.engine.get_task(task_id).await.is_ok());
}

#[tokio::test]
async fn test_broadcast_carries_every_event_regardless_of_recording_rules() {
    let h = harness();
    h.engine
        .register_simple_executor("noop", ScriptedExecutor::completing());
    let mut new_type = quick_type("mail_job", "noop");
    new_type.recorded_events = vec![record(TaskEventType::TaskCompleted)];
    h.engine.create_task_type(new_type).await.unwrap();

    let mut receiver = h.engine.event_publisher().subscribe();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("mail_job", "{}"))
        .await
        .unwrap();
    h.engine.suspend_task(task_id).await.unwrap();
    h.engine.unsuspend_task(task_id).await.unwrap();
    h.drain().await;

    let mut broadcast = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        broadcast.push(event.event_type);
    }
    assert_eq!(
        broadcast,
        vec![
            TaskEventType::TaskSuspended,
            TaskEventType::TaskUnsuspended,
            TaskEventType::TaskCompleted,
        ]
    );

    // Only the opted-in event reached the durable trail.
    let durable: Vec<TaskEventType> = h
        .engine
        .get_task_events_for_task(task_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(durable, vec![TaskEventType::TaskCompleted]);
}

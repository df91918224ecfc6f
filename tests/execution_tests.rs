//! Execution outcome handling: completion, retry budget, delays, multistep
//! sequencing and panic containment, driven through a real worker loop over
//! the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{harness, quick_type, record, PanicExecutor, ScriptedExecutor, ScriptedMultistep};
use taskforge::{
    ExecutionVerdict, QueueTaskRequest, TaskEventType, TaskStatus, TaskStore,
};

#[tokio::test]
async fn test_success_completes_task_and_persists_data() {
    let h = harness();
    let executor = ScriptedExecutor::appending("+done");
    h.engine.register_simple_executor("append", executor.clone());
    h.engine
        .create_task_type(quick_type("append_job", "append"))
        .await
        .unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("append_job", "payload"))
        .await
        .unwrap();
    assert_eq!(h.drain().await, 1);

    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.data, "payload+done");
    assert_eq!(task.execution_attempts, 1);
    assert!(task.lock_name.is_none());
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_fatal_failure_ignores_remaining_attempts() {
    let h = harness();
    let executor = ScriptedExecutor::with_script(vec![ExecutionVerdict::Failed {
        reason: "bad input".to_string(),
    }]);
    h.engine.register_simple_executor("fragile", executor.clone());
    h.engine
        .create_task_type(quick_type("fragile_job", "fragile"))
        .await
        .unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("fragile_job", "{}"))
        .await
        .unwrap();
    h.drain().await;

    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.execution_attempts, 1);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_retry_runs_exactly_the_attempt_budget() {
    let h = harness();
    let executor = ScriptedExecutor::with_script(vec![
        ExecutionVerdict::Retry {
            reason: "flaky".to_string(),
        };
        10
    ]);
    h.engine.register_simple_executor("flaky", executor.clone());
    let mut new_type = quick_type("flaky_job", "flaky");
    new_type.maximum_execution_attempts = 3;
    new_type.recorded_events = vec![
        record(TaskEventType::TaskRetryScheduled),
        record(TaskEventType::TaskFailed),
    ];
    h.engine.create_task_type(new_type).await.unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("flaky_job", "{}"))
        .await
        .unwrap();
    h.drain().await;

    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.execution_attempts, 3);
    assert_eq!(executor.calls(), 3);

    let events: Vec<TaskEventType> = h
        .engine
        .get_task_events_for_task(task_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        events,
        vec![
            TaskEventType::TaskRetryScheduled,
            TaskEventType::TaskRetryScheduled,
            TaskEventType::TaskFailed,
        ]
    );
}

#[tokio::test]
async fn test_delay_reschedules_without_consuming_an_attempt() {
    let h = harness();
    let executor = ScriptedExecutor::with_script(vec![ExecutionVerdict::Delayed {
        delay_ms: 250,
    }]);
    h.engine.register_simple_executor("later", executor.clone());
    h.engine
        .create_task_type(quick_type("later_job", "later"))
        .await
        .unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("later_job", "{}"))
        .await
        .unwrap();
    let before = Utc::now();
    assert_eq!(h.drain().await, 1);

    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.execution_attempts, 0);
    let next = task.next_execution.expect("delay sets next_execution");
    assert!(next >= before + chrono::Duration::milliseconds(250));

    // Not claimable until the delay elapses.
    assert_eq!(h.drain().await, 0);
    assert_eq!(executor.calls(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.drain().await, 1);
    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.execution_attempts, 1);
}

#[tokio::test]
async fn test_multistep_runs_declared_steps_in_order() {
    let h = harness();
    let executor = Arc::new(ScriptedMultistep::shipping());
    h.engine
        .register_multistep_executor("shipping", executor.clone());
    let mut new_type = quick_type("order", "shipping");
    new_type.recorded_events = vec![
        record(TaskEventType::StepCompleted),
        record(TaskEventType::TaskCompleted),
    ];
    h.engine.create_task_type(new_type).await.unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("order", "{}"))
        .await
        .unwrap();
    h.drain().await;

    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.execution_attempts, 4);
    assert_eq!(
        executor.executed_steps(),
        vec!["reserve", "charge", "ship", "notify"]
    );

    let events = h.engine.get_task_events_for_task(task_id).await.unwrap();
    let summary: Vec<(TaskEventType, Option<String>)> = events
        .iter()
        .map(|e| (e.event_type, e.task_step.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (TaskEventType::StepCompleted, Some("reserve".to_string())),
            (TaskEventType::StepCompleted, Some("charge".to_string())),
            (TaskEventType::StepCompleted, Some("ship".to_string())),
            (TaskEventType::TaskCompleted, Some("notify".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_multistep_fatal_failure_stops_mid_sequence() {
    let h = harness();
    let executor = Arc::new(ScriptedMultistep::shipping().script(
        "charge",
        vec![ExecutionVerdict::Failed {
            reason: "card declined".to_string(),
        }],
    ));
    h.engine
        .register_multistep_executor("shipping", executor.clone());
    h.engine
        .create_task_type(quick_type("order", "shipping"))
        .await
        .unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("order", "{}"))
        .await
        .unwrap();
    h.drain().await;

    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.step.as_deref(), Some("charge"));
    assert_eq!(executor.executed_steps(), vec!["reserve", "charge"]);
}

#[tokio::test]
async fn test_multistep_finished_skips_remaining_steps() {
    let h = harness();
    let executor = Arc::new(ScriptedMultistep::shipping().script(
        "reserve",
        vec![ExecutionVerdict::Success {
            finished: true,
            data_changed: false,
        }],
    ));
    h.engine
        .register_multistep_executor("shipping", executor.clone());
    h.engine
        .create_task_type(quick_type("order", "shipping"))
        .await
        .unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("order", "{}"))
        .await
        .unwrap();
    h.drain().await;

    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(executor.executed_steps(), vec!["reserve"]);
}

#[tokio::test]
async fn test_step_delay_defers_the_next_step() {
    let h = harness();
    let executor = Arc::new(ScriptedMultistep::with_steps(vec![
        taskforge::TaskStep::new("collect", "Collect"),
        taskforge::TaskStep::new("settle", "Settle").with_delay_ms(200),
    ]));
    h.engine
        .register_multistep_executor("settlement", executor.clone());
    h.engine
        .create_task_type(quick_type("settlement_job", "settlement"))
        .await
        .unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("settlement_job", "{}"))
        .await
        .unwrap();
    h.drain().await;

    // The first step ran; the second waits out its declared delay.
    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.step.as_deref(), Some("settle"));
    assert!(task.next_execution.is_some());
    assert_eq!(executor.executed_steps(), vec!["collect"]);

    tokio::time::sleep(Duration::from_millis(250)).await;
    h.drain().await;
    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(executor.executed_steps(), vec!["collect", "settle"]);
}

#[tokio::test]
async fn test_executor_panic_fails_the_task() {
    let h = harness();
    h.engine
        .register_simple_executor("panicky", Arc::new(PanicExecutor));
    h.engine
        .create_task_type(quick_type("panicky_job", "panicky"))
        .await
        .unwrap();

    let task_id = h
        .engine
        .queue_task(QueueTaskRequest::new("panicky_job", "{}"))
        .await
        .unwrap();
    h.drain().await;

    let task = h.engine.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.lock_name.is_none());
}

#[tokio::test]
async fn test_claim_prefers_higher_priority_types() {
    let h = harness();
    let executor = ScriptedExecutor::completing();
    h.engine.register_simple_executor("noop", executor);
    let mut low = quick_type("low_job", "noop");
    low.priority = 1;
    let mut high = quick_type("high_job", "noop");
    high.priority = 9;
    h.engine.create_task_type(low).await.unwrap();
    h.engine.create_task_type(high).await.unwrap();

    let low_id = h
        .engine
        .queue_task(QueueTaskRequest::new("low_job", "{}"))
        .await
        .unwrap();
    let high_id = h
        .engine
        .queue_task(QueueTaskRequest::new("high_job", "{}"))
        .await
        .unwrap();

    let first = h
        .store
        .claim_next_task("probe", Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, high_id);
    let second = h
        .store
        .claim_next_task("probe", Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, low_id);
}

//! Shared harness for the integration suite: an engine over the in-memory
//! store plus scriptable executors.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskforge::{
    EngineConfig, EventRecordingRule, ExecutionVerdict, MemoryTaskStore, MultistepTaskExecutor,
    NewTaskType, SimpleTaskExecutor, Task, TaskEngine, TaskEventType, TaskStep, TaskWorker,
};

pub struct Harness {
    pub engine: TaskEngine,
    pub store: Arc<MemoryTaskStore>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryTaskStore::new());
    let engine = TaskEngine::new(store.clone(), EngineConfig::default());
    Harness { engine, store }
}

impl Harness {
    pub fn worker(&self, id: &str) -> TaskWorker {
        TaskWorker::new(self.engine.controller().clone(), id)
    }

    /// Run one worker until the claim pool is empty.
    pub async fn drain(&self) -> usize {
        self.worker("test-worker").drain().await.unwrap()
    }
}

/// A type with a zero retry delay so drained retries re-run immediately.
pub fn quick_type(code: &str, executor: &str) -> NewTaskType {
    let mut new_type = NewTaskType::new(code, code, executor);
    new_type.retry_delay_ms = 0;
    new_type
}

pub fn record(event_type: TaskEventType) -> EventRecordingRule {
    EventRecordingRule {
        event_type,
        with_task_data: false,
    }
}

/// Simple executor that replays a scripted verdict sequence, then keeps
/// succeeding. Optionally appends a marker to the task data on every call.
pub struct ScriptedExecutor {
    verdicts: Mutex<VecDeque<ExecutionVerdict>>,
    calls: AtomicUsize,
    append: Option<String>,
}

impl ScriptedExecutor {
    pub fn completing() -> Arc<Self> {
        Self::with_script(Vec::new())
    }

    pub fn with_script(verdicts: Vec<ExecutionVerdict>) -> Arc<Self> {
        Arc::new(Self {
            verdicts: Mutex::new(verdicts.into()),
            calls: AtomicUsize::new(0),
            append: None,
        })
    }

    pub fn appending(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            verdicts: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            append: Some(marker.to_string()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimpleTaskExecutor for ScriptedExecutor {
    async fn execute_task(&self, _task: &Task, data: &mut String) -> ExecutionVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.append {
            data.push_str(marker);
        }
        self.verdicts
            .lock()
            .pop_front()
            .unwrap_or_else(|| ExecutionVerdict::success(self.append.is_some()))
    }
}

/// Executor that always panics; used to verify panic containment.
pub struct PanicExecutor;

#[async_trait]
impl SimpleTaskExecutor for PanicExecutor {
    async fn execute_task(&self, _task: &Task, _data: &mut String) -> ExecutionVerdict {
        panic!("scripted panic");
    }
}

/// Multistep executor over a fixed step sequence with per-step verdict
/// scripts; unscripted steps report a non-final success.
pub struct ScriptedMultistep {
    steps: Vec<TaskStep>,
    scripts: Mutex<HashMap<String, VecDeque<ExecutionVerdict>>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedMultistep {
    /// A four-step fulfillment pipeline: reserve, charge, ship, notify.
    pub fn shipping() -> Self {
        Self::with_steps(vec![
            TaskStep::new("reserve", "Reserve stock"),
            TaskStep::new("charge", "Charge payment"),
            TaskStep::new("ship", "Ship order"),
            TaskStep::new("notify", "Notify customer"),
        ])
    }

    pub fn with_steps(steps: Vec<TaskStep>) -> Self {
        Self {
            steps,
            scripts: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, step: &str, verdicts: Vec<ExecutionVerdict>) -> Self {
        self.scripts
            .lock()
            .insert(step.to_string(), verdicts.into());
        self
    }

    pub fn executed_steps(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl MultistepTaskExecutor for ScriptedMultistep {
    fn steps(&self) -> &[TaskStep] {
        &self.steps
    }

    async fn execute_task_step(
        &self,
        _task: &Task,
        step: &TaskStep,
        _data: &mut String,
    ) -> ExecutionVerdict {
        self.executed.lock().push(step.name.clone());
        self.scripts
            .lock()
            .get_mut(&step.name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| ExecutionVerdict::step_done(false))
    }
}

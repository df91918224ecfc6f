//! # Worker Loop
//!
//! One [`TaskWorker`] repeatedly claims and executes whatever is claimable,
//! then sleeps until the next scheduling tick; it never busy-spins within
//! a tick. A [`WorkerPool`] runs several workers plus the periodic
//! hung-task and archive sweeps, all against the same shared store; the
//! store's atomic claim is the only coordination between them.
//!
//! Worker identity is an explicit id threaded through every claim, never a
//! process-global.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::archiver::Archiver;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::{ExecutionVerdict, ExecutorKind};
use crate::lifecycle::{ClaimedTask, LifecycleController};
use crate::state_machine::TaskStatus;

/// A single claim-execute-apply loop bound to one worker identity.
pub struct TaskWorker {
    controller: Arc<LifecycleController>,
    worker_id: String,
}

impl TaskWorker {
    pub fn new(controller: Arc<LifecycleController>, worker_id: impl Into<String>) -> Self {
        Self {
            controller,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim and execute until the claim pool is empty. Returns the number
    /// of attempts executed this tick.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn drain(&self) -> Result<usize> {
        let mut executed = 0usize;
        while let Some(claimed) = self.controller.claim_next_task(&self.worker_id).await? {
            self.execute_claimed(claimed).await?;
            executed += 1;
        }
        if executed > 0 {
            debug!(executed, "Worker tick drained");
        }
        Ok(executed)
    }

    /// Run the claimed task through its executor and apply the outcome.
    /// A panicking executor is contained and treated as a fatal failure.
    async fn execute_claimed(&self, claimed: ClaimedTask) -> Result<TaskStatus> {
        let Some(kind) = self
            .controller
            .registry()
            .resolve(&claimed.task_type.executor)
        else {
            // Validated at type-creation time; hitting this means the
            // registry of a newer deployment no longer carries the id.
            let reason = format!(
                "executor '{}' is not registered",
                claimed.task_type.executor
            );
            return self
                .controller
                .apply_execution_result(
                    &claimed,
                    claimed.task.data.clone(),
                    ExecutionVerdict::Failed { reason },
                )
                .await;
        };

        let mut data = claimed.task.data.clone();
        let verdict = match &kind {
            ExecutorKind::Simple(executor) => {
                AssertUnwindSafe(executor.execute_task(&claimed.task, &mut data))
                    .catch_unwind()
                    .await
            }
            ExecutorKind::Multistep(executor) => {
                let steps = executor.steps();
                let current = claimed
                    .task
                    .step
                    .as_deref()
                    .and_then(|name| steps.iter().find(|s| s.name == name))
                    .or_else(|| steps.first());
                match current {
                    Some(step) => {
                        AssertUnwindSafe(executor.execute_task_step(
                            &claimed.task,
                            step,
                            &mut data,
                        ))
                        .catch_unwind()
                        .await
                    }
                    None => Ok(ExecutionVerdict::Failed {
                        reason: "multistep executor declares no steps".to_string(),
                    }),
                }
            }
        };
        let verdict = verdict.unwrap_or_else(|_| {
            error!(task_id = %claimed.task.id, "Executor panicked; failing task");
            ExecutionVerdict::Failed {
                reason: "executor panicked".to_string(),
            }
        });

        self.controller
            .apply_execution_result(&claimed, data, verdict)
            .await
    }

    /// Drive the worker on a fixed tick until `shutdown` flips.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.drain().await {
                        error!(worker_id = %self.worker_id, error = %err, "Worker tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(worker_id = %self.worker_id, "Worker shutting down");
                        return;
                    }
                }
            }
        }
    }
}

/// Spawns worker loops and the periodic sweeps on the tokio runtime.
pub struct WorkerPool {
    controller: Arc<LifecycleController>,
    archiver: Arc<Archiver>,
    config: EngineConfig,
}

impl WorkerPool {
    pub fn new(
        controller: Arc<LifecycleController>,
        archiver: Arc<Archiver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            controller,
            archiver,
            config,
        }
    }

    /// Start `worker_count` workers plus the hung-task and archive sweeps.
    /// Each worker gets a unique id derived from `worker_prefix`.
    pub fn spawn(&self, worker_prefix: &str) -> PoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for index in 0..self.config.worker_count {
            let worker = TaskWorker::new(
                self.controller.clone(),
                format!("{worker_prefix}-{index}-{}", Uuid::now_v7()),
            );
            let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                worker.run(poll_interval, shutdown).await;
            }));
        }

        {
            let controller = self.controller.clone();
            let interval = Duration::from_millis(self.config.hung_sweep_interval_ms);
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                run_sweep("hung-task", interval, shutdown, move || {
                    let controller = controller.clone();
                    async move { controller.reset_hung_tasks().await }
                })
                .await;
            }));
        }

        {
            let archiver = self.archiver.clone();
            let interval = Duration::from_millis(self.config.archive_sweep_interval_ms);
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                run_sweep("archive", interval, shutdown, move || {
                    let archiver = archiver.clone();
                    async move { archiver.archive_and_delete_historical_tasks().await }
                })
                .await;
            }));
        }

        info!(
            workers = self.config.worker_count,
            prefix = worker_prefix,
            "Worker pool started"
        );
        PoolHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }
}

async fn run_sweep<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut sweep: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<usize>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first interval tick fires immediately; skip it so a sweep does
    // not race engine startup.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep().await {
                    Ok(touched) if touched > 0 => {
                        debug!(sweep = name, touched, "Sweep finished");
                    }
                    Ok(_) => {}
                    Err(err) => error!(sweep = name, error = %err, "Sweep failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Handle for a running pool; dropping it does not stop the workers.
pub struct PoolHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl PoolHandle {
    /// Signal every worker and sweep to stop, then wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

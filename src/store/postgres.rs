//! # PostgreSQL Task Store
//!
//! Production [`TaskStore`] backed by sqlx. Claiming uses a
//! `FOR UPDATE SKIP LOCKED` CTE so that any number of workers can poll the
//! same table and exactly one wins each row; outcome application and the
//! hung-task reset are single conditional `UPDATE`s.
//!
//! The schema lives in [`MIGRATION_SQL`]; call
//! [`PgTaskStore::run_migrations`] once at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{ArchivedTask, Page, SummaryQuery, Task, TaskEvent, TaskSummary, TaskType};
use crate::models::{EventRecordingRule, SortDirection, SummarySortField, TaskEventType};
use crate::state_machine::TaskStatus;
use crate::store::{AttemptUpdate, StoreResult, TaskStore};

/// Schema DDL, idempotent via `IF NOT EXISTS`.
pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS taskforge_tasks (
    id UUID PRIMARY KEY,
    task_type TEXT NOT NULL,
    batch_id TEXT,
    external_reference TEXT UNIQUE,
    status TEXT NOT NULL,
    step TEXT,
    data TEXT NOT NULL,
    priority INTEGER NOT NULL,
    execution_attempts INTEGER NOT NULL DEFAULT 0,
    queued TIMESTAMPTZ NOT NULL,
    executed TIMESTAMPTZ,
    next_execution TIMESTAMPTZ,
    lock_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_taskforge_tasks_claim
    ON taskforge_tasks (priority DESC, queued ASC)
    WHERE status = 'queued';

CREATE INDEX IF NOT EXISTS idx_taskforge_tasks_batch
    ON taskforge_tasks (batch_id)
    WHERE batch_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS taskforge_task_types (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    priority INTEGER NOT NULL,
    executor TEXT NOT NULL,
    enabled BOOLEAN NOT NULL,
    maximum_execution_attempts INTEGER NOT NULL,
    retry_delay_ms BIGINT NOT NULL,
    execution_timeout_ms BIGINT NOT NULL,
    archive_completed BOOLEAN NOT NULL,
    archive_failed BOOLEAN NOT NULL,
    recorded_events JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS taskforge_task_events (
    id UUID PRIMARY KEY,
    task_id UUID NOT NULL,
    event_type TEXT NOT NULL,
    task_step TEXT,
    occurred_at TIMESTAMPTZ NOT NULL,
    task_data TEXT
);

CREATE INDEX IF NOT EXISTS idx_taskforge_task_events_task
    ON taskforge_task_events (task_id, occurred_at);

CREATE TABLE IF NOT EXISTS taskforge_archived_tasks (
    id UUID PRIMARY KEY,
    task_type TEXT NOT NULL,
    batch_id TEXT,
    external_reference TEXT,
    status TEXT NOT NULL,
    step TEXT,
    data TEXT NOT NULL,
    execution_attempts INTEGER NOT NULL,
    queued TIMESTAMPTZ NOT NULL,
    executed TIMESTAMPTZ,
    archived_at TIMESTAMPTZ NOT NULL,
    event_log JSONB NOT NULL
);
"#;

const TASK_COLUMNS: &str = "id, task_type, batch_id, external_reference, status, step, data, \
     priority, execution_attempts, queued, executed, next_execution, lock_name";

// Qualified variant for queries where a join would make the names ambiguous.
const TASK_COLUMNS_QUALIFIED: &str = "t.id, t.task_type, t.batch_id, t.external_reference, \
     t.status, t.step, t.data, t.priority, t.execution_attempts, t.queued, t.executed, \
     t.next_execution, t.lock_name";

/// sqlx-backed store for multi-process deployments.
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute the idempotent schema DDL.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in MIGRATION_SQL.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!("Task store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Internal row structs for runtime-checked queries.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    task_type: String,
    batch_id: Option<String>,
    external_reference: Option<String>,
    status: String,
    step: Option<String>,
    data: String,
    priority: i32,
    execution_attempts: i32,
    queued: DateTime<Utc>,
    executed: Option<DateTime<Utc>>,
    next_execution: Option<DateTime<Utc>>,
    lock_name: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status: TaskStatus = row
            .status
            .parse()
            .map_err(|e: String| StoreError::Backend(e))?;
        Ok(Task {
            id: row.id,
            task_type: row.task_type,
            batch_id: row.batch_id,
            external_reference: row.external_reference,
            status,
            step: row.step,
            data: row.data,
            priority: row.priority,
            execution_attempts: row.execution_attempts,
            queued: row.queued,
            executed: row.executed,
            next_execution: row.next_execution,
            lock_name: row.lock_name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskTypeRow {
    code: String,
    name: String,
    priority: i32,
    executor: String,
    enabled: bool,
    maximum_execution_attempts: i32,
    retry_delay_ms: i64,
    execution_timeout_ms: i64,
    archive_completed: bool,
    archive_failed: bool,
    recorded_events: serde_json::Value,
}

impl TryFrom<TaskTypeRow> for TaskType {
    type Error = StoreError;

    fn try_from(row: TaskTypeRow) -> Result<Self, Self::Error> {
        let recorded_events: Vec<EventRecordingRule> =
            serde_json::from_value(row.recorded_events)?;
        Ok(TaskType {
            code: row.code,
            name: row.name,
            priority: row.priority,
            executor: row.executor,
            enabled: row.enabled,
            maximum_execution_attempts: row.maximum_execution_attempts,
            retry_delay_ms: row.retry_delay_ms,
            execution_timeout_ms: row.execution_timeout_ms,
            archive_completed: row.archive_completed,
            archive_failed: row.archive_failed,
            recorded_events,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    task_id: Uuid,
    event_type: String,
    task_step: Option<String>,
    occurred_at: DateTime<Utc>,
    task_data: Option<String>,
}

impl TryFrom<EventRow> for TaskEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type: TaskEventType = row
            .event_type
            .parse()
            .map_err(|e: String| StoreError::Backend(e))?;
        Ok(TaskEvent {
            id: row.id,
            task_id: row.task_id,
            event_type,
            task_step: row.task_step,
            timestamp: row.occurred_at,
            task_data: row.task_data,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ArchivedTaskRow {
    id: Uuid,
    task_type: String,
    batch_id: Option<String>,
    external_reference: Option<String>,
    status: String,
    step: Option<String>,
    data: String,
    execution_attempts: i32,
    queued: DateTime<Utc>,
    executed: Option<DateTime<Utc>>,
    archived_at: DateTime<Utc>,
    event_log: serde_json::Value,
}

impl TryFrom<ArchivedTaskRow> for ArchivedTask {
    type Error = StoreError;

    fn try_from(row: ArchivedTaskRow) -> Result<Self, Self::Error> {
        let status: TaskStatus = row
            .status
            .parse()
            .map_err(|e: String| StoreError::Backend(e))?;
        let event_log: Vec<TaskEvent> = serde_json::from_value(row.event_log)?;
        Ok(ArchivedTask {
            id: row.id,
            task_type: row.task_type,
            batch_id: row.batch_id,
            external_reference: row.external_reference,
            status,
            step: row.step,
            data: row.data,
            execution_attempts: row.execution_attempts,
            queued: row.queued,
            executed: row.executed,
            archived_at: row.archived_at,
            event_log,
        })
    }
}

fn status_strings(statuses: &[TaskStatus]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert_task(&self, task: Task) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO taskforge_tasks (id, task_type, batch_id, external_reference, status, \
             step, data, priority, execution_attempts, queued, executed, next_execution, lock_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(task.id)
        .bind(&task.task_type)
        .bind(&task.batch_id)
        .bind(&task.external_reference)
        .bind(task.status.to_string())
        .bind(&task.step)
        .bind(&task.data)
        .bind(task.priority)
        .bind(task.execution_attempts)
        .bind(task.queued)
        .bind(task.executed)
        .bind(task.next_execution)
        .bind(&task.lock_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM taskforge_tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn find_task_by_external_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM taskforge_tasks WHERE external_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn external_reference_exists(&self, reference: &str) -> StoreResult<bool> {
        let row =
            sqlx::query("SELECT 1 FROM taskforge_tasks WHERE external_reference = $1 LIMIT 1")
                .bind(reference)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self), fields(worker_id = %worker_id))]
    async fn claim_next_task(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "WITH next_task AS ( \
                 SELECT id FROM taskforge_tasks \
                 WHERE status = 'queued' \
                   AND (next_execution IS NULL OR next_execution <= $2) \
                 ORDER BY priority DESC, queued ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE taskforge_tasks t \
             SET status = 'executing', \
                 lock_name = $1, \
                 executed = $2, \
                 execution_attempts = t.execution_attempts + 1, \
                 next_execution = NULL \
             FROM next_task \
             WHERE t.id = next_task.id \
             RETURNING {TASK_COLUMNS_QUALIFIED}"
        ))
        .bind(worker_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn complete_attempt(&self, update: AttemptUpdate) -> StoreResult<Option<Task>> {
        // RHS references to `status` read the pre-update value: a row
        // suspended mid-attempt keeps its suspension on a re-queue outcome.
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE taskforge_tasks \
             SET status = CASE WHEN status = 'suspended' AND $3 = 'queued' \
                               THEN 'suspended' ELSE $3 END, \
                 step = $4, \
                 data = $5, \
                 next_execution = CASE WHEN status = 'executing' AND $3 = 'queued' \
                                       THEN $6 ELSE NULL END, \
                 execution_attempts = execution_attempts - CASE WHEN $7 THEN 1 ELSE 0 END, \
                 lock_name = NULL \
             WHERE id = $1 AND lock_name = $2 AND status IN ('executing', 'suspended') \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(update.task_id)
        .bind(&update.worker_id)
        .bind(update.status.to_string())
        .bind(&update.step)
        .bind(&update.data)
        .bind(update.next_execution)
        .bind(update.rewind_attempt)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> StoreResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE taskforge_tasks \
             SET status = $2, \
                 next_execution = NULL, \
                 lock_name = CASE WHEN $2 = 'suspended' AND status = 'executing' \
                                  THEN lock_name ELSE NULL END \
             WHERE id = $1 AND status = ANY($3) \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(to.to_string())
        .bind(status_strings(from))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn transition_batch(
        &self,
        batch_id: &str,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE taskforge_tasks \
             SET status = $2, \
                 next_execution = NULL, \
                 lock_name = CASE WHEN $2 = 'suspended' AND status = 'executing' \
                                  THEN lock_name ELSE NULL END \
             WHERE batch_id = $1 AND status = ANY($3) \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(batch_id)
        .bind(to.to_string())
        .bind(status_strings(from))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn find_hung_tasks(&self, now: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS_QUALIFIED} \
             FROM taskforge_tasks t \
             JOIN taskforge_task_types tt ON tt.code = t.task_type \
             WHERE t.status = 'executing' \
               AND t.executed IS NOT NULL \
               AND t.executed + tt.execution_timeout_ms * INTERVAL '1 millisecond' < $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn reset_task(
        &self,
        id: Uuid,
        lock_name: &str,
        executed_seen: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE taskforge_tasks \
             SET status = 'queued', lock_name = NULL, next_execution = NULL \
             WHERE id = $1 AND status = 'executing' AND lock_name = $2 AND executed = $3",
        )
        .bind(id)
        .bind(lock_name)
        .bind(executed_seen)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_task_summaries(
        &self,
        query: &SummaryQuery,
    ) -> StoreResult<Page<TaskSummary>> {
        fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a SummaryQuery) {
            let mut first = true;
            let mut sep = |builder: &mut QueryBuilder<'a, Postgres>| {
                builder.push(if std::mem::take(&mut first) {
                    " WHERE "
                } else {
                    " AND "
                });
            };
            if let Some(task_type) = &query.task_type {
                sep(builder);
                builder.push("task_type = ").push_bind(task_type);
            }
            if let Some(status) = query.status {
                sep(builder);
                builder.push("status = ").push_bind(status.to_string());
            }
            if let Some(text) = &query.text {
                let pattern = format!("%{text}%");
                sep(builder);
                builder
                    .push("(id::text ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR external_reference ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR batch_id ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count_builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM taskforge_tasks");
        push_filters(&mut count_builder, query);
        let total: i64 = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .get(0);

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TASK_COLUMNS} FROM taskforge_tasks"
        ));
        push_filters(&mut builder, query);
        let sort_column = match query.sort_field {
            SummarySortField::Queued => "queued",
            SummarySortField::Type => "task_type",
            SummarySortField::Status => "status",
        };
        let direction = match query.sort_direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        builder.push(format!(
            " ORDER BY {sort_column} {direction}, id {direction} LIMIT "
        ));
        builder.push_bind(i64::from(query.page_size));
        builder.push(" OFFSET ");
        builder.push_bind(query.offset() as i64);

        let rows: Vec<TaskRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(|row| Task::try_from(row).map(|task| TaskSummary::from(&task)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: total as u64,
            page_index: query.page_index,
            page_size: query.page_size,
        })
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM taskforge_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_task_type(&self, task_type: TaskType) -> StoreResult<()> {
        let recorded_events = serde_json::to_value(&task_type.recorded_events)?;
        sqlx::query(
            "INSERT INTO taskforge_task_types (code, name, priority, executor, enabled, \
             maximum_execution_attempts, retry_delay_ms, execution_timeout_ms, \
             archive_completed, archive_failed, recorded_events) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&task_type.code)
        .bind(&task_type.name)
        .bind(task_type.priority)
        .bind(&task_type.executor)
        .bind(task_type.enabled)
        .bind(task_type.maximum_execution_attempts)
        .bind(task_type.retry_delay_ms)
        .bind(task_type.execution_timeout_ms)
        .bind(task_type.archive_completed)
        .bind(task_type.archive_failed)
        .bind(recorded_events)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_task_type(&self, code: &str) -> StoreResult<Option<TaskType>> {
        let row = sqlx::query_as::<_, TaskTypeRow>(
            "SELECT code, name, priority, executor, enabled, maximum_execution_attempts, \
             retry_delay_ms, execution_timeout_ms, archive_completed, archive_failed, \
             recorded_events \
             FROM taskforge_task_types WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TaskType::try_from).transpose()
    }

    async fn append_event(&self, event: TaskEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO taskforge_task_events (id, task_id, event_type, task_step, \
             occurred_at, task_data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.task_id)
        .bind(event.event_type.to_string())
        .bind(&event.task_step)
        .bind(event.timestamp)
        .bind(&event.task_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_events_for_task(&self, task_id: Uuid) -> StoreResult<Vec<TaskEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT id, task_id, event_type, task_step, occurred_at, task_data \
             FROM taskforge_task_events WHERE task_id = $1 \
             ORDER BY occurred_at ASC, id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TaskEvent::try_from).collect()
    }

    async fn delete_events_for_task(&self, task_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM taskforge_task_events WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_archivable_tasks(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM taskforge_tasks \
             WHERE status IN ('completed', 'failed') \
               AND COALESCE(executed, queued) <= $1 \
             ORDER BY queued ASC, id ASC \
             LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn insert_archived_task(&self, archived: ArchivedTask) -> StoreResult<()> {
        let event_log = serde_json::to_value(&archived.event_log)?;
        sqlx::query(
            "INSERT INTO taskforge_archived_tasks (id, task_type, batch_id, \
             external_reference, status, step, data, execution_attempts, queued, executed, \
             archived_at, event_log) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(archived.id)
        .bind(&archived.task_type)
        .bind(&archived.batch_id)
        .bind(&archived.external_reference)
        .bind(archived.status.to_string())
        .bind(&archived.step)
        .bind(&archived.data)
        .bind(archived.execution_attempts)
        .bind(archived.queued)
        .bind(archived.executed)
        .bind(archived.archived_at)
        .bind(event_log)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_archived_task(&self, id: Uuid) -> StoreResult<Option<ArchivedTask>> {
        let row = sqlx::query_as::<_, ArchivedTaskRow>(
            "SELECT id, task_type, batch_id, external_reference, status, step, data, \
             execution_attempts, queued, executed, archived_at, event_log \
             FROM taskforge_archived_tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ArchivedTask::try_from).transpose()
    }
}

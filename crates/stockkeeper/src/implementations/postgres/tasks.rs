//! The persisted task records. `create` runs on its own pooled connection
//! and commits before returning, so a worker picking the task up on another
//! connection always sees the row.

use std::str::FromStr as _;

use chrono::{DateTime, Utc};

use crate::{
    implementations::postgres::{DBErrorHandler as _, PostgresStore},
    service::{
        StoreError,
        tasks::{
            NewTask, Task, TaskCounts, TaskId, TaskKind, TaskKindStats, TaskStatus, TaskStore,
        },
    },
};

#[derive(sqlx::FromRow, Debug)]
struct TaskRow {
    id: i64,
    kind: String,
    status: String,
    progress: f32,
    phase: Option<String>,
    message: Option<String>,
    file_name: Option<String>,
    total_records: Option<i64>,
    processed_records: Option<i64>,
    error_count: i64,
    error_message: Option<String>,
    result_path: Option<String>,
    cancellation_requested: bool,
    parameters: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, StoreError> {
        let kind = TaskKind::from_str(&row.kind).map_err(|_| {
            StoreError::Integrity(format!("unknown task kind `{}` in database", row.kind))
        })?;
        let status = TaskStatus::from_str(&row.status).map_err(|_| {
            StoreError::Integrity(format!("unknown task status `{}` in database", row.status))
        })?;
        Ok(Self {
            id: TaskId::from(row.id),
            kind,
            status,
            progress: row.progress,
            phase: row.phase,
            message: row.message,
            file_name: row.file_name,
            total_records: row.total_records,
            processed_records: row.processed_records,
            error_count: row.error_count,
            error_message: row.error_message,
            result_path: row.result_path,
            cancellation_requested: row.cancellation_requested,
            parameters: row.parameters,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            updated_at: row.updated_at,
        })
    }
}

const TASK_COLUMNS: &str = "id, kind, status, progress, phase, message, file_name, \
     total_records, processed_records, error_count, error_message, result_path, \
     cancellation_requested, parameters, created_at, started_at, ended_at, updated_at";

#[async_trait::async_trait]
impl TaskStore for PostgresStore {
    #[tracing::instrument(skip(self), fields(kind = %task.kind))]
    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        let row: TaskRow = sqlx::query_as(&format!(
            "INSERT INTO task_run (kind, file_name, parameters) VALUES ($1, $2, $3) \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(task.kind.to_string())
        .bind(task.file_name)
        .bind(task.parameters)
        .fetch_one(self.write_pool())
        .await
        .map_err(|e| e.into_store_error("Failed to create task"))?;
        row.try_into()
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        // Last-writer-wins full-row merge, except the cancellation flag,
        // which only an external actor flips and which must stay monotonic.
        let result = sqlx::query(
            r"
            UPDATE task_run SET
                status = $2,
                progress = $3,
                phase = $4,
                message = $5,
                file_name = $6,
                total_records = $7,
                processed_records = $8,
                error_count = $9,
                error_message = $10,
                result_path = $11,
                cancellation_requested = cancellation_requested OR $12,
                parameters = $13,
                started_at = $14,
                ended_at = $15,
                updated_at = $16
            WHERE id = $1
            ",
        )
        .bind(*task.id)
        .bind(task.status.to_string())
        .bind(task.progress)
        .bind(&task.phase)
        .bind(&task.message)
        .bind(&task.file_name)
        .bind(task.total_records)
        .bind(task.processed_records)
        .bind(task.error_count)
        .bind(&task.error_message)
        .bind(&task.result_path)
        .bind(task.cancellation_requested)
        .bind(&task.parameters)
        .bind(task.started_at)
        .bind(task.ended_at)
        .bind(task.updated_at)
        .execute(self.write_pool())
        .await
        .map_err(|e| e.into_store_error("Failed to update task"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", task.id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM task_run WHERE id = $1"))
                .bind(*id)
                .fetch_optional(self.read_pool())
                .await
                .map_err(|e| e.into_store_error("Failed to load task"))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task_run ORDER BY id DESC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.read_pool())
        .await
        .map_err(|e| e.into_store_error("Failed to list recent tasks"))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_status(
        &self,
        status: TaskStatus,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task_run WHERE status = $1 ORDER BY id DESC LIMIT $2"
        ))
        .bind(status.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.read_pool())
        .await
        .map_err(|e| e.into_store_error("Failed to list tasks by status"))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_by_status(&self) -> Result<TaskCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, count(*) FROM task_run GROUP BY status")
                .fetch_all(self.read_pool())
                .await
                .map_err(|e| e.into_store_error("Failed to count tasks"))?;
        let mut counts = TaskCounts::default();
        for (status, count) in rows {
            counts.total += count;
            match TaskStatus::from_str(&status) {
                Ok(TaskStatus::Pending) => counts.pending = count,
                Ok(TaskStatus::Running) => counts.running = count,
                Ok(TaskStatus::Completed) => counts.completed = count,
                Ok(TaskStatus::Failed) => counts.failed = count,
                Ok(TaskStatus::Cancelled) => counts.cancelled = count,
                Err(_) => {
                    return Err(StoreError::Integrity(format!(
                        "unknown task status `{status}` in database"
                    )));
                }
            }
        }
        Ok(counts)
    }

    async fn request_cancellation(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        sqlx::query(
            "UPDATE task_run SET cancellation_requested = TRUE, updated_at = now() \
             WHERE id = $1 AND status IN ('PENDING', 'RUNNING')",
        )
        .bind(*id)
        .execute(self.write_pool())
        .await
        .map_err(|e| e.into_store_error("Failed to request task cancellation"))?;
        self.get(id).await
    }

    async fn stats_by_kind_since(
        &self,
        kind: TaskKind,
        days: i64,
    ) -> Result<TaskKindStats, StoreError> {
        let row: (i64, i64, i64) = sqlx::query_as(
            r"
            SELECT
                count(*),
                count(*) FILTER (WHERE status = 'COMPLETED'),
                count(*) FILTER (WHERE status = 'FAILED')
            FROM task_run
            WHERE kind = $1 AND created_at >= now() - make_interval(days => $2::int)
            ",
        )
        .bind(kind.to_string())
        .bind(days)
        .fetch_one(self.read_pool())
        .await
        .map_err(|e| e.into_store_error("Failed to compute task stats"))?;
        Ok(TaskKindStats {
            total: row.0,
            completed: row.1,
            failed: row.2,
        })
    }
}

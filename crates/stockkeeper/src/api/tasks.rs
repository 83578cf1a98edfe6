//! Task inspection and control endpoints. Clients poll these; the records
//! themselves are owned by the workers.

use std::str::FromStr as _;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::{
    api::{ErrorModel, Result},
    service::{
        State as ServiceState, Task,
        tasks::{TaskCounts, TaskId, TaskKind, TaskKindStats, TaskStatus},
    },
};

const LIST_LIMIT_DEFAULT: usize = 50;
const LIST_LIMIT_CAP: usize = 200;
const STATUS_LIMIT_CAP: usize = 100;
const STATS_DAYS_DEFAULT: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatsResponse {
    pub total: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl From<TaskCounts> for TaskStatsResponse {
    fn from(counts: TaskCounts) -> Self {
        Self {
            total: counts.total,
            running: counts.running,
            completed: counts.completed,
            failed: counts.failed,
            cancelled: counts.cancelled,
        }
    }
}

fn task_not_found(id: i64) -> ErrorModel {
    ErrorModel::not_found(
        format!("Task with id `{id}` not found"),
        "TaskNotFound",
        None,
    )
}

pub(crate) async fn get_task(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>> {
    state
        .tasks
        .get(TaskId::from(id))
        .await?
        .map(Json)
        .ok_or_else(|| task_not_found(id))
}

pub(crate) async fn cancel_task(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let Some(task) = state.tasks.request_cancellation(TaskId::from(id)).await? else {
        return Err(task_not_found(id));
    };
    if task.status.is_terminal() {
        return Err(ErrorModel::bad_request(
            format!("Task `{id}` is already {} and cannot be cancelled", task.status),
            "TaskAlreadyTerminal",
            None,
        ));
    }
    Ok((StatusCode::ACCEPTED, Json(task)))
}

pub(crate) async fn list_tasks(
    State(state): State<ServiceState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>> {
    let limit = query.limit.unwrap_or(LIST_LIMIT_DEFAULT).min(LIST_LIMIT_CAP);
    Ok(Json(state.tasks.list_recent(limit).await?))
}

pub(crate) async fn list_by_status(
    State(state): State<ServiceState>,
    Path(status): Path<String>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>> {
    let parsed = TaskStatus::from_str(&status.to_uppercase()).map_err(|_| {
        ErrorModel::bad_request(
            format!("Unknown task status `{status}`"),
            "UnknownTaskStatus",
            None,
        )
    })?;
    let limit = query
        .limit
        .unwrap_or(LIST_LIMIT_DEFAULT)
        .min(STATUS_LIMIT_CAP);
    Ok(Json(state.tasks.list_by_status(parsed, limit).await?))
}

pub(crate) async fn stats(State(state): State<ServiceState>) -> Result<Json<TaskStatsResponse>> {
    Ok(Json(state.tasks.count_by_status().await?.into()))
}

pub(crate) async fn stats_by_kind(
    State(state): State<ServiceState>,
    Path(kind): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<TaskKindStats>> {
    let parsed = TaskKind::from_str(&kind.to_uppercase()).map_err(|_| {
        ErrorModel::bad_request(format!("Unknown task kind `{kind}`"), "UnknownTaskKind", None)
    })?;
    let days = query.days.unwrap_or(STATS_DAYS_DEFAULT).max(0);
    Ok(Json(state.tasks.stats_by_kind_since(parsed, days).await?))
}

/// Streams the result file of a COMPLETED task; 409 before completion.
pub(crate) async fn get_result(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let Some(task) = state.tasks.get(TaskId::from(id)).await? else {
        return Err(task_not_found(id));
    };
    if task.status != TaskStatus::Completed {
        return Err(ErrorModel::conflict(
            format!("Task `{id}` is {}, result not available", task.status),
            "TaskResultNotReady",
            None,
        ));
    }
    let Some(result_path) = task.result_path else {
        return Err(ErrorModel::not_found(
            format!("Task `{id}` has no result file"),
            "TaskResultMissing",
            None,
        ));
    };
    let file = tokio::fs::File::open(&result_path).await.map_err(|e| {
        ErrorModel::not_found(
            format!("Result file for task `{id}` is no longer available"),
            "TaskResultMissing",
            Some(Box::new(e)),
        )
    })?;
    let file_name = std::path::Path::new(&result_path)
        .file_name()
        .map_or_else(|| format!("task_{id}.tsv"), |n| n.to_string_lossy().into_owned());
    let body = axum::body::Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (http::header::CONTENT_TYPE, "text/tab-separated-values".to_string()),
            (
                http::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    ))
}

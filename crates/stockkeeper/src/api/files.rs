//! Upload and download endpoints, synchronous and task-backed. Upload
//! bodies are raw TSV bytes; the surrounding multipart handling is an
//! adapter concern and stays outside this crate.

use std::str::FromStr as _;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Deserialize;

use crate::{
    api::{ErrorModel, Result},
    service::{
        DownloadKind, State as ServiceState, UploadKind, UploadOutcome,
        ingest::UploadResponse,
        tasks::{NewTask, Submission, TaskOutcome},
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    pub run_id: Option<i64>,
}

fn parse_upload_kind(kind: &str) -> Result<UploadKind> {
    UploadKind::from_str(kind).map_err(|_| {
        ErrorModel::not_found(
            format!("Unknown upload kind `{kind}`"),
            "UnknownUploadKind",
            None,
        )
    })
}

fn parse_download_kind(kind: &str) -> Result<DownloadKind> {
    DownloadKind::from_str(kind).map_err(|_| {
        ErrorModel::not_found(
            format!("Unknown download kind `{kind}`"),
            "UnknownDownloadKind",
            None,
        )
    })
}

pub(crate) fn submission_response(submission: Submission) -> Response {
    match submission {
        Submission::Accepted(task) => (StatusCode::ACCEPTED, Json(task)).into_response(),
        Submission::Rejected(task) => (StatusCode::TOO_MANY_REQUESTS, Json(task)).into_response(),
    }
}

/// Synchronous upload: the pipeline runs on the request and the caller gets
/// the full [`UploadResponse`], 400 when the upload was rejected.
pub(crate) async fn upload_sync(
    State(state): State<ServiceState>,
    Path(kind): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let kind = parse_upload_kind(&kind)?;
    match state.pipeline().run(kind, &body, None).await? {
        UploadOutcome::Done(response) => {
            let status = if response.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            Ok((status, Json(response)).into_response())
        }
        // No task handle was supplied, so no checkpoint can fire.
        UploadOutcome::Cancelled => Err(ErrorModel::internal(
            "Synchronous upload reported a cancellation",
            "UnexpectedCancellation",
            None,
        )),
    }
}

pub(crate) async fn upload_async(
    State(state): State<ServiceState>,
    Path(kind): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Response> {
    let kind = parse_upload_kind(&kind)?;
    let new_task = NewTask::builder()
        .kind(kind.task_kind())
        .file_name(query.file_name)
        .build();
    let pipeline = state.pipeline();
    let submission = state
        .scheduler
        .submit(new_task, move |handle| async move {
            match pipeline.run(kind, &body, Some(&handle)).await? {
                UploadOutcome::Cancelled => Ok(TaskOutcome::Cancelled),
                UploadOutcome::Done(response) if response.success => {
                    Ok(completed_upload(&response))
                }
                UploadOutcome::Done(response) => Err(ErrorModel::bad_request(
                    response.message,
                    "UploadRejected",
                    None,
                )),
            }
        })
        .await?;
    Ok(submission_response(submission))
}

fn completed_upload(response: &UploadResponse) -> TaskOutcome {
    TaskOutcome::Completed(crate::service::tasks::TaskCompletion {
        message: Some(response.message.clone()),
        processed_records: Some(response.record_count as i64),
        total_records: Some((response.record_count + response.skipped_count) as i64),
        error_count: response.error_count as i64,
        result_path: None,
    })
}

/// Synchronous download: renders the TSV in-request and streams it back.
pub(crate) async fn download_sync(
    State(state): State<ServiceState>,
    Path(kind): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let kind = parse_download_kind(&kind)?;
    let rendered = state.downloads().render(kind, query.run_id).await?;
    Ok((
        [
            (
                http::header::CONTENT_TYPE,
                "text/tab-separated-values".to_string(),
            ),
            (
                http::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", rendered.file_name),
            ),
        ],
        rendered.content,
    )
        .into_response())
}

pub(crate) async fn download_async(
    State(state): State<ServiceState>,
    Path(kind): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let kind = parse_download_kind(&kind)?;
    let new_task = NewTask::builder().kind(kind.task_kind()).build();
    let downloads = state.downloads();
    let run_id = query.run_id;
    let submission = state
        .scheduler
        .submit(new_task, move |handle| async move {
            if handle.cancellation_requested().await? {
                return Ok(TaskOutcome::Cancelled);
            }
            handle.progress(20.0, "building file").await?;
            let artifact = downloads.build_file(kind, run_id, handle.id()).await?;
            Ok(TaskOutcome::Completed(
                crate::service::tasks::TaskCompletion {
                    message: Some(format!("Exported {} rows", artifact.rows)),
                    processed_records: Some(artifact.rows as i64),
                    total_records: Some(artifact.rows as i64),
                    error_count: 0,
                    result_path: Some(artifact.path),
                },
            ))
        })
        .await?;
    Ok(submission_response(submission))
}

//! Algorithm run submission and result listings.

use std::str::FromStr as _;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    api::{ErrorModel, Result, files::submission_response},
    service::{
        AlgorithmParameters, NoosResult, NoosRunOutcome, NoosType, State as ServiceState,
        noos::NoosRunSummary,
        tasks::{NewTask, TaskCompletion, TaskKind, TaskOutcome},
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsQuery {
    pub run_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoosResultsResponse {
    pub run_id: Option<i64>,
    pub count: usize,
    pub results: Vec<NoosResult>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoosSummaryResponse {
    pub run_id: Option<i64>,
    pub calculated_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub core: usize,
    pub bestseller: usize,
    pub fashion: usize,
    pub recent_runs: Vec<i64>,
}

/// Submits an algorithm run. The body may carry a full parameter set; an
/// empty body runs with the active set (or the built-in defaults).
pub(crate) async fn run_async(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<Response> {
    let parameters: AlgorithmParameters = if body.is_empty() {
        state
            .store
            .active_parameters()
            .await?
            .unwrap_or_default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ErrorModel::bad_request(
                format!("Invalid algorithm parameters: {e}"),
                "InvalidAlgorithmParameters",
                Some(Box::new(e)),
            )
        })?
    };
    parameters.validate()?;

    let new_task = NewTask::builder()
        .kind(TaskKind::AlgorithmRun)
        .parameters(Some(parameters.encode_for_task()))
        .build();
    let engine = state.engine();
    let submission = state
        .scheduler
        .submit(new_task, move |handle| async move {
            match engine.run(&parameters, handle.id(), Some(&handle)).await? {
                NoosRunOutcome::Cancelled => Ok(TaskOutcome::Cancelled),
                NoosRunOutcome::Completed(summary) => Ok(completed_run(&summary)),
            }
        })
        .await?;
    Ok(submission_response(submission))
}

fn completed_run(summary: &NoosRunSummary) -> TaskOutcome {
    TaskOutcome::Completed(TaskCompletion {
        message: Some(format!(
            "Classified {} styles across {} categories from {} sales",
            summary.styles_classified, summary.categories, summary.sales_analyzed
        )),
        processed_records: Some(summary.styles_classified as i64),
        total_records: Some(summary.styles_classified as i64),
        error_count: 0,
        result_path: None,
    })
}

pub(crate) async fn list_results(
    State(state): State<ServiceState>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<NoosResultsResponse>> {
    let run_id = match query.run_id {
        Some(run_id) => Some(run_id),
        None => state.store.latest_noos_run_id().await?,
    };
    let results = match run_id {
        Some(run_id) => state.store.list_noos_results(Some(run_id)).await?,
        None => Vec::new(),
    };
    Ok(Json(NoosResultsResponse {
        run_id,
        count: results.len(),
        results,
    }))
}

pub(crate) async fn list_by_type(
    State(state): State<ServiceState>,
    Path(noos_type): Path<String>,
) -> Result<Json<NoosResultsResponse>> {
    let parsed = NoosType::from_str(&noos_type.to_lowercase()).map_err(|_| {
        ErrorModel::bad_request(
            format!("Unknown NOOS type `{noos_type}`"),
            "UnknownNoosType",
            None,
        )
    })?;
    let run_id = state.store.latest_noos_run_id().await?;
    let results = match run_id {
        Some(run_id) => state
            .store
            .list_noos_results(Some(run_id))
            .await?
            .into_iter()
            .filter(|r| r.r#type == parsed)
            .collect(),
        None => Vec::new(),
    };
    Ok(Json(NoosResultsResponse {
        run_id,
        count: results.len(),
        results,
    }))
}

pub(crate) async fn summary(
    State(state): State<ServiceState>,
) -> Result<Json<NoosSummaryResponse>> {
    let run_id = state.store.latest_noos_run_id().await?;
    let results = match run_id {
        Some(run_id) => state.store.list_noos_results(Some(run_id)).await?,
        None => Vec::new(),
    };
    let count_of = |wanted: NoosType| results.iter().filter(|r| r.r#type == wanted).count();
    Ok(Json(NoosSummaryResponse {
        run_id,
        calculated_at: results.first().map(|r| r.calculated_at),
        total: results.len(),
        core: count_of(NoosType::Core),
        bestseller: count_of(NoosType::Bestseller),
        fashion: count_of(NoosType::Fashion),
        recent_runs: state.store.recent_noos_run_ids(10).await?,
    }))
}

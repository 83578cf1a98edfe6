//! Algorithm parameter set CRUD. Activation is the only way a set becomes
//! active, keeping the zero-or-one-active invariant in one place.

use axum::{
    Json,
    extract::{Path, State},
};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{
    api::{ErrorModel, Result},
    service::{AlgorithmParameters, State as ServiceState},
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSetList {
    pub count: usize,
    pub parameter_sets: Vec<AlgorithmParameters>,
}

pub(crate) async fn list(State(state): State<ServiceState>) -> Result<Json<ParameterSetList>> {
    let parameter_sets = state.store.list_parameters().await?;
    Ok(Json(ParameterSetList {
        count: parameter_sets.len(),
        parameter_sets,
    }))
}

pub(crate) async fn get(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> Result<Json<AlgorithmParameters>> {
    state
        .store
        .get_parameters(&name)
        .await?
        .map(Json)
        .ok_or_else(|| parameter_set_not_found(&name))
}

/// Upsert. The activation state of an existing set is preserved; a new set
/// starts inactive and must be activated explicitly.
pub(crate) async fn put(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
    Json(body): Json<AlgorithmParameters>,
) -> Result<Json<AlgorithmParameters>> {
    let mut params = body;
    params.parameter_set = name.clone();
    params.validate()?;
    params.is_active = state
        .store
        .get_parameters(&name)
        .await?
        .is_some_and(|existing| existing.is_active);
    let stored = state.store.upsert_parameters(params).await?;
    Ok(Json(stored))
}

pub(crate) async fn activate(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<AlgorithmParameters>)> {
    if state.store.get_parameters(&name).await?.is_none() {
        return Err(parameter_set_not_found(&name));
    }
    let activated = state.store.activate_parameters(&name).await?;
    Ok((StatusCode::OK, Json(activated)))
}

fn parameter_set_not_found(name: &str) -> ErrorModel {
    ErrorModel::not_found(
        format!("Parameter set `{name}` not found"),
        "ParameterSetNotFound",
        None,
    )
}

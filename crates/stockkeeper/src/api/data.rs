//! Administrative endpoints: fresh-start purge and the audit trail.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    api::Result,
    service::{AuditAction, AuditEntry, NewAuditEntry, State as ServiceState},
};

const AUDIT_LIMIT_DEFAULT: usize = 100;
const AUDIT_LIMIT_CAP: usize = 500;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearAllResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// Clears all business data (sales, skus, styles, stores, tasks, NOOS
/// results) in one transaction and resets identity counters. Parameter
/// sets and the audit log survive.
pub(crate) async fn clear_all(State(state): State<ServiceState>) -> Result<Json<ClearAllResponse>> {
    state.store.clear_all().await?;
    state
        .store
        .record_audit(vec![NewAuditEntry::system(
            "system",
            "*",
            AuditAction::ClearAll,
            "All business data cleared",
        )])
        .await?;
    tracing::info!("All business data cleared");
    Ok(Json(ClearAllResponse {
        success: true,
        message: "All data cleared".to_string(),
    }))
}

pub(crate) async fn list_audit(
    State(state): State<ServiceState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>> {
    let limit = query
        .limit
        .unwrap_or(AUDIT_LIMIT_DEFAULT)
        .min(AUDIT_LIMIT_CAP);
    Ok(Json(state.store.list_audit(limit).await?))
}

//! Algorithm parameter sets, the audit log and the clear-all purge.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::{
    DaysAvailablePolicy,
    implementations::postgres::DBErrorHandler as _,
    service::{AlgorithmParameters, AuditAction, AuditEntry, NewAuditEntry, StoreError},
};

#[derive(sqlx::FromRow, Debug)]
struct ParametersRow {
    parameter_set: String,
    liquidation_threshold: f64,
    bestseller_multiplier: f64,
    min_volume_threshold: f64,
    consistency_threshold: f64,
    analysis_start_date: Option<NaiveDate>,
    analysis_end_date: Option<NaiveDate>,
    core_duration_months: i32,
    bestseller_duration_days: i32,
    days_available_policy: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ParametersRow> for AlgorithmParameters {
    type Error = StoreError;

    fn try_from(row: ParametersRow) -> Result<Self, StoreError> {
        let days_available_policy = row
            .days_available_policy
            .map(|p| {
                DaysAvailablePolicy::from_str(&p).map_err(|_| {
                    StoreError::Integrity(format!("unknown days-available policy `{p}` in database"))
                })
            })
            .transpose()?;
        Ok(Self {
            parameter_set: row.parameter_set,
            liquidation_threshold: row.liquidation_threshold,
            bestseller_multiplier: row.bestseller_multiplier,
            min_volume_threshold: row.min_volume_threshold,
            consistency_threshold: row.consistency_threshold,
            analysis_start_date: row.analysis_start_date,
            analysis_end_date: row.analysis_end_date,
            core_duration_months: row.core_duration_months,
            bestseller_duration_days: row.bestseller_duration_days,
            days_available_policy,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PARAMS_COLUMNS: &str = "parameter_set, liquidation_threshold, bestseller_multiplier, \
     min_volume_threshold, consistency_threshold, analysis_start_date, analysis_end_date, \
     core_duration_months, bestseller_duration_days, days_available_policy, is_active, \
     created_at, updated_at";

pub(crate) async fn get_parameters(
    pool: &PgPool,
    name: &str,
) -> Result<Option<AlgorithmParameters>, StoreError> {
    let row: Option<ParametersRow> = sqlx::query_as(&format!(
        "SELECT {PARAMS_COLUMNS} FROM algorithm_parameters WHERE parameter_set = $1"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(|e| e.into_store_error("Failed to load parameter set"))?;
    row.map(TryInto::try_into).transpose()
}

pub(crate) async fn list_parameters(
    pool: &PgPool,
) -> Result<Vec<AlgorithmParameters>, StoreError> {
    let rows: Vec<ParametersRow> = sqlx::query_as(&format!(
        "SELECT {PARAMS_COLUMNS} FROM algorithm_parameters ORDER BY parameter_set"
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| e.into_store_error("Failed to list parameter sets"))?;
    rows.into_iter().map(TryInto::try_into).collect()
}

pub(crate) async fn upsert_parameters(
    pool: &PgPool,
    params: AlgorithmParameters,
) -> Result<AlgorithmParameters, StoreError> {
    let row: ParametersRow = sqlx::query_as(&format!(
        r"
        INSERT INTO algorithm_parameters (
            parameter_set, liquidation_threshold, bestseller_multiplier,
            min_volume_threshold, consistency_threshold, analysis_start_date,
            analysis_end_date, core_duration_months, bestseller_duration_days,
            days_available_policy, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (parameter_set) DO UPDATE SET
            liquidation_threshold = EXCLUDED.liquidation_threshold,
            bestseller_multiplier = EXCLUDED.bestseller_multiplier,
            min_volume_threshold = EXCLUDED.min_volume_threshold,
            consistency_threshold = EXCLUDED.consistency_threshold,
            analysis_start_date = EXCLUDED.analysis_start_date,
            analysis_end_date = EXCLUDED.analysis_end_date,
            core_duration_months = EXCLUDED.core_duration_months,
            bestseller_duration_days = EXCLUDED.bestseller_duration_days,
            days_available_policy = EXCLUDED.days_available_policy,
            is_active = EXCLUDED.is_active,
            updated_at = now()
        RETURNING {PARAMS_COLUMNS}
        "
    ))
    .bind(&params.parameter_set)
    .bind(params.liquidation_threshold)
    .bind(params.bestseller_multiplier)
    .bind(params.min_volume_threshold)
    .bind(params.consistency_threshold)
    .bind(params.analysis_start_date)
    .bind(params.analysis_end_date)
    .bind(params.core_duration_months)
    .bind(params.bestseller_duration_days)
    .bind(params.days_available_policy.map(|p| p.to_string()))
    .bind(params.is_active)
    .fetch_one(pool)
    .await
    .map_err(|e| e.into_store_error("Failed to upsert parameter set"))?;
    row.try_into()
}

pub(crate) async fn activate_parameters(
    pool: &PgPool,
    name: &str,
) -> Result<AlgorithmParameters, StoreError> {
    let mut trx = pool
        .begin()
        .await
        .map_err(|e| e.into_store_error("Failed to begin activation transaction"))?;

    sqlx::query(
        "UPDATE algorithm_parameters SET is_active = FALSE, updated_at = now() WHERE is_active AND parameter_set <> $1",
    )
    .bind(name)
    .execute(&mut *trx)
    .await
    .map_err(|e| e.into_store_error("Failed to deactivate parameter sets"))?;

    let row: Option<ParametersRow> = sqlx::query_as(&format!(
        r"
        UPDATE algorithm_parameters SET is_active = TRUE, updated_at = now()
        WHERE parameter_set = $1
        RETURNING {PARAMS_COLUMNS}
        "
    ))
    .bind(name)
    .fetch_optional(&mut *trx)
    .await
    .map_err(|e| e.into_store_error("Failed to activate parameter set"))?;

    let Some(row) = row else {
        return Err(StoreError::not_found("parameter set", name));
    };

    trx.commit()
        .await
        .map_err(|e| e.into_store_error("Failed to commit activation"))?;
    row.try_into()
}

pub(crate) async fn active_parameters(
    pool: &PgPool,
) -> Result<Option<AlgorithmParameters>, StoreError> {
    let row: Option<ParametersRow> = sqlx::query_as(&format!(
        "SELECT {PARAMS_COLUMNS} FROM algorithm_parameters WHERE is_active"
    ))
    .fetch_optional(pool)
    .await
    .map_err(|e| e.into_store_error("Failed to load active parameter set"))?;
    row.map(TryInto::try_into).transpose()
}

#[derive(sqlx::FromRow, Debug)]
struct AuditRow {
    id: i64,
    logged_at: DateTime<Utc>,
    entity_type: String,
    entity_id: String,
    action: String,
    details: String,
    modified_by: String,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, StoreError> {
        let action = AuditAction::from_str(&row.action).map_err(|_| {
            StoreError::Integrity(format!("unknown audit action `{}` in database", row.action))
        })?;
        Ok(Self {
            id: row.id,
            logged_at: row.logged_at,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            action,
            details: row.details,
            modified_by: row.modified_by,
        })
    }
}

pub(crate) async fn record_audit(
    pool: &PgPool,
    entries: Vec<NewAuditEntry>,
) -> Result<(), StoreError> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut entity_types = Vec::with_capacity(entries.len());
    let mut entity_ids = Vec::with_capacity(entries.len());
    let mut actions = Vec::with_capacity(entries.len());
    let mut details = Vec::with_capacity(entries.len());
    let mut modified_by = Vec::with_capacity(entries.len());
    for entry in entries {
        entity_types.push(entry.entity_type);
        entity_ids.push(entry.entity_id);
        actions.push(entry.action.to_string());
        details.push(entry.details);
        modified_by.push(entry.modified_by);
    }
    sqlx::query(
        r"
        INSERT INTO audit_log (entity_type, entity_id, action, details, modified_by)
        SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::TEXT[])
        ",
    )
    .bind(&entity_types)
    .bind(&entity_ids)
    .bind(&actions)
    .bind(&details)
    .bind(&modified_by)
    .execute(pool)
    .await
    .map_err(|e| e.into_store_error("Failed to record audit entries"))?;
    Ok(())
}

pub(crate) async fn list_audit(pool: &PgPool, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
    let rows: Vec<AuditRow> = sqlx::query_as(
        "SELECT id, logged_at, entity_type, entity_id, action, details, modified_by \
         FROM audit_log ORDER BY id DESC LIMIT $1",
    )
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await
    .map_err(|e| e.into_store_error("Failed to list audit entries"))?;
    rows.into_iter().map(TryInto::try_into).collect()
}

/// One transaction, foreign-key-safe: truncating the full set at once lets
/// postgres resolve the reference order, and RESTART IDENTITY resets the
/// counters.
pub(crate) async fn clear_all(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query("TRUNCATE sale, sku, style, store_branch, task_run, noos_result RESTART IDENTITY")
        .execute(pool)
        .await
        .map_err(|e| e.into_store_error("Failed to clear business data"))?;
    Ok(())
}

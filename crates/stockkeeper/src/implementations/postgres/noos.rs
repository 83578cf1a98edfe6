//! NOOS result persistence: whole-table replacement in one transaction,
//! inserting in small batches to bound statement size and memory.

use std::str::FromStr as _;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::{
    CONFIG,
    implementations::postgres::DBErrorHandler as _,
    service::{NewNoosResult, NoosResult, NoosType, StoreError},
};

#[derive(sqlx::FromRow, Debug)]
struct NoosResultRow {
    id: i64,
    algorithm_run_id: i64,
    category: String,
    style_code: String,
    style_ros: Decimal,
    noos_type: String,
    style_rev_contribution: Decimal,
    total_quantity_sold: i64,
    total_revenue: Decimal,
    days_available: i64,
    days_with_sales: i64,
    avg_discount: Decimal,
    calculated_at: DateTime<Utc>,
}

impl TryFrom<NoosResultRow> for NoosResult {
    type Error = StoreError;

    fn try_from(row: NoosResultRow) -> Result<Self, StoreError> {
        let noos_type = NoosType::from_str(&row.noos_type).map_err(|_| {
            StoreError::Integrity(format!("unknown noos type `{}` in database", row.noos_type))
        })?;
        Ok(Self {
            id: row.id,
            algorithm_run_id: row.algorithm_run_id,
            category: row.category,
            style_code: row.style_code,
            style_ros: row.style_ros,
            r#type: noos_type,
            style_rev_contribution: row.style_rev_contribution,
            total_quantity_sold: row.total_quantity_sold,
            total_revenue: row.total_revenue,
            days_available: row.days_available,
            days_with_sales: row.days_with_sales,
            avg_discount: row.avg_discount,
            calculated_at: row.calculated_at,
        })
    }
}

const NOOS_COLUMNS: &str = "id, algorithm_run_id, category, style_code, style_ros, noos_type, \
     style_rev_contribution, total_quantity_sold, total_revenue, days_available, days_with_sales, \
     avg_discount, calculated_at";

pub(crate) async fn replace_noos_results(
    pool: &PgPool,
    rows: Vec<NewNoosResult>,
) -> Result<u64, StoreError> {
    let mut trx = pool
        .begin()
        .await
        .map_err(|e| e.into_store_error("Failed to begin NOOS replacement transaction"))?;

    sqlx::query("DELETE FROM noos_result")
        .execute(&mut *trx)
        .await
        .map_err(|e| e.into_store_error("Failed to delete previous NOOS results"))?;

    let mut inserted = 0u64;
    for chunk in rows.chunks(CONFIG.noos.persist_batch_size.max(1)) {
        let mut run_ids = Vec::with_capacity(chunk.len());
        let mut categories = Vec::with_capacity(chunk.len());
        let mut style_codes = Vec::with_capacity(chunk.len());
        let mut ros = Vec::with_capacity(chunk.len());
        let mut types = Vec::with_capacity(chunk.len());
        let mut contributions = Vec::with_capacity(chunk.len());
        let mut quantities = Vec::with_capacity(chunk.len());
        let mut revenues = Vec::with_capacity(chunk.len());
        let mut days_available = Vec::with_capacity(chunk.len());
        let mut days_with_sales = Vec::with_capacity(chunk.len());
        let mut discounts = Vec::with_capacity(chunk.len());
        let mut calculated = Vec::with_capacity(chunk.len());
        for row in chunk {
            run_ids.push(row.algorithm_run_id);
            categories.push(row.category.clone());
            style_codes.push(row.style_code.clone());
            ros.push(row.style_ros);
            types.push(row.r#type.to_string());
            contributions.push(row.style_rev_contribution);
            quantities.push(row.total_quantity_sold);
            revenues.push(row.total_revenue);
            days_available.push(row.days_available);
            days_with_sales.push(row.days_with_sales);
            discounts.push(row.avg_discount);
            calculated.push(row.calculated_at);
        }
        let result = sqlx::query(
            r"
            INSERT INTO noos_result (
                algorithm_run_id, category, style_code, style_ros, noos_type,
                style_rev_contribution, total_quantity_sold, total_revenue,
                days_available, days_with_sales, avg_discount, calculated_at
            )
            SELECT * FROM UNNEST(
                $1::BIGINT[], $2::TEXT[], $3::TEXT[], $4::NUMERIC[], $5::TEXT[],
                $6::NUMERIC[], $7::BIGINT[], $8::NUMERIC[],
                $9::BIGINT[], $10::BIGINT[], $11::NUMERIC[], $12::TIMESTAMPTZ[]
            )
            ",
        )
        .bind(&run_ids)
        .bind(&categories)
        .bind(&style_codes)
        .bind(&ros)
        .bind(&types)
        .bind(&contributions)
        .bind(&quantities)
        .bind(&revenues)
        .bind(&days_available)
        .bind(&days_with_sales)
        .bind(&discounts)
        .bind(&calculated)
        .execute(&mut *trx)
        .await
        .map_err(|e| e.into_store_error("Failed to insert NOOS results batch"))?;
        inserted += result.rows_affected();
    }

    trx.commit()
        .await
        .map_err(|e| e.into_store_error("Failed to commit NOOS replacement"))?;
    Ok(inserted)
}

pub(crate) async fn list_noos_results(
    pool: &PgPool,
    run_id: Option<i64>,
) -> Result<Vec<NoosResult>, StoreError> {
    let rows: Vec<NoosResultRow> = match run_id {
        Some(run_id) => {
            sqlx::query_as(&format!(
                "SELECT {NOOS_COLUMNS} FROM noos_result WHERE algorithm_run_id = $1 ORDER BY category, style_code"
            ))
            .bind(run_id)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {NOOS_COLUMNS} FROM noos_result ORDER BY category, style_code"
            ))
            .fetch_all(pool)
            .await
        }
    }
    .map_err(|e| e.into_store_error("Failed to list NOOS results"))?;
    rows.into_iter().map(TryInto::try_into).collect()
}

pub(crate) async fn latest_noos_run_id(pool: &PgPool) -> Result<Option<i64>, StoreError> {
    let row: (Option<i64>,) = sqlx::query_as("SELECT max(algorithm_run_id) FROM noos_result")
        .fetch_one(pool)
        .await
        .map_err(|e| e.into_store_error("Failed to resolve latest NOOS run"))?;
    Ok(row.0)
}

pub(crate) async fn recent_noos_run_ids(
    pool: &PgPool,
    limit: usize,
) -> Result<Vec<i64>, StoreError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT algorithm_run_id FROM noos_result ORDER BY algorithm_run_id DESC LIMIT $1",
    )
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await
    .map_err(|e| e.into_store_error("Failed to list recent NOOS runs"))?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

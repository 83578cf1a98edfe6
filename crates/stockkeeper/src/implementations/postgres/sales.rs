//! Sales queries. Uploads are complete replacements: truncate with identity
//! restart, then chunked UNNEST inserts, all in one transaction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::{
    implementations::postgres::DBErrorHandler as _,
    service::{NewSaleRecord, SaleRecord, StoreError},
};

const INSERT_CHUNK: usize = 1000;

#[derive(sqlx::FromRow, Debug)]
struct SaleRow {
    id: i64,
    day: NaiveDate,
    sku_id: i64,
    store_id: i64,
    quantity: i64,
    discount: Decimal,
    revenue: Decimal,
}

impl From<SaleRow> for SaleRecord {
    fn from(row: SaleRow) -> Self {
        Self {
            id: row.id,
            day: row.day,
            sku_id: row.sku_id,
            store_id: row.store_id,
            quantity: row.quantity,
            discount: row.discount,
            revenue: row.revenue,
        }
    }
}

const SALE_COLUMNS: &str = "id, day, sku_id, store_id, quantity, discount, revenue";

pub(crate) async fn list_sales(
    pool: &PgPool,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<SaleRecord>, StoreError> {
    let rows: Vec<SaleRow> = match range {
        Some((start, end)) => {
            sqlx::query_as(&format!(
                "SELECT {SALE_COLUMNS} FROM sale WHERE day >= $1 AND day <= $2 ORDER BY id"
            ))
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as(&format!("SELECT {SALE_COLUMNS} FROM sale ORDER BY id"))
                .fetch_all(pool)
                .await
        }
    }
    .map_err(|e| e.into_store_error("Failed to list sales"))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn count_sales(pool: &PgPool) -> Result<i64, StoreError> {
    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM sale")
        .fetch_one(pool)
        .await
        .map_err(|e| e.into_store_error("Failed to count sales"))?;
    Ok(count.0)
}

pub(crate) async fn replace_sales(
    pool: &PgPool,
    rows: Vec<NewSaleRecord>,
) -> Result<u64, StoreError> {
    let mut trx = pool
        .begin()
        .await
        .map_err(|e| e.into_store_error("Failed to begin sales replacement transaction"))?;

    sqlx::query("TRUNCATE sale RESTART IDENTITY")
        .execute(&mut *trx)
        .await
        .map_err(|e| e.into_store_error("Failed to truncate sales"))?;

    let mut inserted = 0u64;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut days = Vec::with_capacity(chunk.len());
        let mut sku_ids = Vec::with_capacity(chunk.len());
        let mut store_ids = Vec::with_capacity(chunk.len());
        let mut quantities = Vec::with_capacity(chunk.len());
        let mut discounts = Vec::with_capacity(chunk.len());
        let mut revenues = Vec::with_capacity(chunk.len());
        for row in chunk {
            days.push(row.day);
            sku_ids.push(row.sku_id);
            store_ids.push(row.store_id);
            quantities.push(row.quantity);
            discounts.push(row.discount);
            revenues.push(row.revenue);
        }
        let result = sqlx::query(
            r"
            INSERT INTO sale (day, sku_id, store_id, quantity, discount, revenue)
            SELECT * FROM UNNEST($1::DATE[], $2::BIGINT[], $3::BIGINT[], $4::BIGINT[], $5::NUMERIC[], $6::NUMERIC[])
            ",
        )
        .bind(&days)
        .bind(&sku_ids)
        .bind(&store_ids)
        .bind(&quantities)
        .bind(&discounts)
        .bind(&revenues)
        .execute(&mut *trx)
        .await
        .map_err(|e| e.into_store_error("Failed to insert sales batch"))?;
        inserted += result.rows_affected();
    }

    trx.commit()
        .await
        .map_err(|e| e.into_store_error("Failed to commit sales replacement"))?;
    Ok(inserted)
}

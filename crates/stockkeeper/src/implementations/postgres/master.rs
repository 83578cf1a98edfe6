//! Master data queries: styles, skus, stores. Upload batches are applied in
//! one transaction each; inserts go through UNNEST so a batch is one round
//! trip.

use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::{
    implementations::postgres::DBErrorHandler as _,
    service::{NewSku, NewStore, NewStyle, Sku, Store, StoreError, Style},
};

#[derive(sqlx::FromRow, Debug)]
struct StyleRow {
    id: i64,
    style_code: String,
    brand: String,
    category: String,
    sub_category: String,
    mrp: Decimal,
    gender: String,
}

impl From<StyleRow> for Style {
    fn from(row: StyleRow) -> Self {
        Self {
            id: row.id,
            style_code: row.style_code,
            brand: row.brand,
            category: row.category,
            sub_category: row.sub_category,
            mrp: row.mrp,
            gender: row.gender,
        }
    }
}

const STYLE_COLUMNS: &str = "id, style_code, brand, category, sub_category, mrp, gender";

pub(crate) async fn list_styles(pool: &PgPool) -> Result<Vec<Style>, StoreError> {
    let rows: Vec<StyleRow> =
        sqlx::query_as(&format!("SELECT {STYLE_COLUMNS} FROM style ORDER BY id"))
            .fetch_all(pool)
            .await
            .map_err(|e| e.into_store_error("Failed to list styles"))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn find_styles_by_codes(
    pool: &PgPool,
    codes: &[String],
) -> Result<Vec<Style>, StoreError> {
    if codes.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<StyleRow> = sqlx::query_as(&format!(
        "SELECT {STYLE_COLUMNS} FROM style WHERE style_code = ANY($1)"
    ))
    .bind(codes)
    .fetch_all(pool)
    .await
    .map_err(|e| e.into_store_error("Failed to look up styles by code"))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn apply_style_batch(
    pool: &PgPool,
    inserts: Vec<NewStyle>,
    updates: Vec<Style>,
) -> Result<(), StoreError> {
    let mut trx = pool
        .begin()
        .await
        .map_err(|e| e.into_store_error("Failed to begin style batch transaction"))?;

    for update in updates {
        sqlx::query(
            "UPDATE style SET brand = $2, category = $3, sub_category = $4, mrp = $5, gender = $6 WHERE id = $1",
        )
        .bind(update.id)
        .bind(&update.brand)
        .bind(&update.category)
        .bind(&update.sub_category)
        .bind(update.mrp)
        .bind(&update.gender)
        .execute(&mut *trx)
        .await
        .map_err(|e| e.into_store_error("Failed to update style"))?;
    }

    if !inserts.is_empty() {
        let mut codes = Vec::with_capacity(inserts.len());
        let mut brands = Vec::with_capacity(inserts.len());
        let mut categories = Vec::with_capacity(inserts.len());
        let mut sub_categories = Vec::with_capacity(inserts.len());
        let mut mrps = Vec::with_capacity(inserts.len());
        let mut genders = Vec::with_capacity(inserts.len());
        for insert in inserts {
            codes.push(insert.style_code);
            brands.push(insert.brand);
            categories.push(insert.category);
            sub_categories.push(insert.sub_category);
            mrps.push(insert.mrp);
            genders.push(insert.gender);
        }
        sqlx::query(
            r"
            INSERT INTO style (style_code, brand, category, sub_category, mrp, gender)
            SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::NUMERIC[], $6::TEXT[])
            ",
        )
        .bind(&codes)
        .bind(&brands)
        .bind(&categories)
        .bind(&sub_categories)
        .bind(&mrps)
        .bind(&genders)
        .execute(&mut *trx)
        .await
        .map_err(|e| e.into_store_error("Failed to insert styles"))?;
    }

    trx.commit()
        .await
        .map_err(|e| e.into_store_error("Failed to commit style batch"))
}

#[derive(sqlx::FromRow, Debug)]
struct SkuRow {
    id: i64,
    sku: String,
    style_id: i64,
    size: String,
}

impl From<SkuRow> for Sku {
    fn from(row: SkuRow) -> Self {
        Self {
            id: row.id,
            sku: row.sku,
            style_id: row.style_id,
            size: row.size,
        }
    }
}

pub(crate) async fn list_skus(pool: &PgPool) -> Result<Vec<Sku>, StoreError> {
    let rows: Vec<SkuRow> = sqlx::query_as("SELECT id, sku, style_id, size FROM sku ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(|e| e.into_store_error("Failed to list skus"))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn find_skus_by_codes(
    pool: &PgPool,
    codes: &[String],
) -> Result<Vec<Sku>, StoreError> {
    if codes.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<SkuRow> =
        sqlx::query_as("SELECT id, sku, style_id, size FROM sku WHERE sku = ANY($1)")
            .bind(codes)
            .fetch_all(pool)
            .await
            .map_err(|e| e.into_store_error("Failed to look up skus by code"))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn apply_sku_batch(
    pool: &PgPool,
    inserts: Vec<NewSku>,
    updates: Vec<Sku>,
) -> Result<(), StoreError> {
    let mut trx = pool
        .begin()
        .await
        .map_err(|e| e.into_store_error("Failed to begin sku batch transaction"))?;

    for update in updates {
        sqlx::query("UPDATE sku SET style_id = $2, size = $3 WHERE id = $1")
            .bind(update.id)
            .bind(update.style_id)
            .bind(&update.size)
            .execute(&mut *trx)
            .await
            .map_err(|e| e.into_store_error("Failed to update sku"))?;
    }

    if !inserts.is_empty() {
        let mut codes = Vec::with_capacity(inserts.len());
        let mut style_ids = Vec::with_capacity(inserts.len());
        let mut sizes = Vec::with_capacity(inserts.len());
        for insert in inserts {
            codes.push(insert.sku);
            style_ids.push(insert.style_id);
            sizes.push(insert.size);
        }
        sqlx::query(
            r"
            INSERT INTO sku (sku, style_id, size)
            SELECT * FROM UNNEST($1::TEXT[], $2::BIGINT[], $3::TEXT[])
            ",
        )
        .bind(&codes)
        .bind(&style_ids)
        .bind(&sizes)
        .execute(&mut *trx)
        .await
        .map_err(|e| e.into_store_error("Failed to insert skus"))?;
    }

    trx.commit()
        .await
        .map_err(|e| e.into_store_error("Failed to commit sku batch"))
}

#[derive(sqlx::FromRow, Debug)]
struct StoreRow {
    id: i64,
    branch: String,
    city: String,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id,
            branch: row.branch,
            city: row.city,
        }
    }
}

pub(crate) async fn list_stores(pool: &PgPool) -> Result<Vec<Store>, StoreError> {
    let rows: Vec<StoreRow> =
        sqlx::query_as("SELECT id, branch, city FROM store_branch ORDER BY id")
            .fetch_all(pool)
            .await
            .map_err(|e| e.into_store_error("Failed to list stores"))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn find_stores_by_branches(
    pool: &PgPool,
    branches: &[String],
) -> Result<Vec<Store>, StoreError> {
    if branches.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<StoreRow> =
        sqlx::query_as("SELECT id, branch, city FROM store_branch WHERE branch = ANY($1)")
            .bind(branches)
            .fetch_all(pool)
            .await
            .map_err(|e| e.into_store_error("Failed to look up stores by branch"))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn apply_store_batch(
    pool: &PgPool,
    inserts: Vec<NewStore>,
    updates: Vec<Store>,
) -> Result<(), StoreError> {
    let mut trx = pool
        .begin()
        .await
        .map_err(|e| e.into_store_error("Failed to begin store batch transaction"))?;

    for update in updates {
        sqlx::query("UPDATE store_branch SET city = $2 WHERE id = $1")
            .bind(update.id)
            .bind(&update.city)
            .execute(&mut *trx)
            .await
            .map_err(|e| e.into_store_error("Failed to update store"))?;
    }

    if !inserts.is_empty() {
        let mut branches = Vec::with_capacity(inserts.len());
        let mut cities = Vec::with_capacity(inserts.len());
        for insert in inserts {
            branches.push(insert.branch);
            cities.push(insert.city);
        }
        sqlx::query(
            "INSERT INTO store_branch (branch, city) SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[])",
        )
        .bind(&branches)
        .bind(&cities)
        .execute(&mut *trx)
        .await
        .map_err(|e| e.into_store_error("Failed to insert stores"))?;
    }

    trx.commit()
        .await
        .map_err(|e| e.into_store_error("Failed to commit store batch"))
}

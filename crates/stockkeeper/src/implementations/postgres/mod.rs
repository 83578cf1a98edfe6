//! The sqlx/postgres store. Queries are runtime-checked (`query_as` with
//! `FromRow` rows); migrations are embedded into the binary.

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{PgConfig, service::StoreError};

mod dbutils;
mod master;
mod noos;
mod params;
mod sales;
mod tasks;

pub(crate) use dbutils::DBErrorHandler;

/// Both stores over a reader and a writer pool, like the service's other
/// deployments split them. For a single-node setup the two may be clones of
/// the same pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    read_pool: PgPool,
    write_pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub fn from_pools(read_pool: PgPool, write_pool: PgPool) -> Self {
        Self {
            read_pool,
            write_pool,
        }
    }

    #[must_use]
    pub fn read_pool(&self) -> &PgPool {
        &self.read_pool
    }

    #[must_use]
    pub fn write_pool(&self) -> &PgPool {
        &self.write_pool
    }
}

pub fn pool_options(config: &PgConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
}

pub async fn get_pool(config: &PgConfig) -> Result<PgPool, StoreError> {
    let url = config.database_url.as_deref().ok_or_else(|| {
        StoreError::Conflict("pg.database_url is not configured".to_string())
    })?;
    pool_options(config)
        .connect(url)
        .await
        .map_err(StoreError::backend)
}

/// Runs the embedded migrations. Must complete before the server accepts
/// requests.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(StoreError::backend)
}

#[async_trait::async_trait]
impl crate::service::RetailStore for PostgresStore {
    async fn list_styles(&self) -> Result<Vec<crate::service::Style>, StoreError> {
        master::list_styles(self.read_pool()).await
    }

    async fn find_styles_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<crate::service::Style>, StoreError> {
        master::find_styles_by_codes(self.read_pool(), codes).await
    }

    async fn apply_style_batch(
        &self,
        inserts: Vec<crate::service::NewStyle>,
        updates: Vec<crate::service::Style>,
    ) -> Result<(), StoreError> {
        master::apply_style_batch(self.write_pool(), inserts, updates).await
    }

    async fn list_skus(&self) -> Result<Vec<crate::service::Sku>, StoreError> {
        master::list_skus(self.read_pool()).await
    }

    async fn find_skus_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<crate::service::Sku>, StoreError> {
        master::find_skus_by_codes(self.read_pool(), codes).await
    }

    async fn apply_sku_batch(
        &self,
        inserts: Vec<crate::service::NewSku>,
        updates: Vec<crate::service::Sku>,
    ) -> Result<(), StoreError> {
        master::apply_sku_batch(self.write_pool(), inserts, updates).await
    }

    async fn list_stores(&self) -> Result<Vec<crate::service::Store>, StoreError> {
        master::list_stores(self.read_pool()).await
    }

    async fn find_stores_by_branches(
        &self,
        branches: &[String],
    ) -> Result<Vec<crate::service::Store>, StoreError> {
        master::find_stores_by_branches(self.read_pool(), branches).await
    }

    async fn apply_store_batch(
        &self,
        inserts: Vec<crate::service::NewStore>,
        updates: Vec<crate::service::Store>,
    ) -> Result<(), StoreError> {
        master::apply_store_batch(self.write_pool(), inserts, updates).await
    }

    async fn list_sales(
        &self,
        range: Option<(chrono::NaiveDate, chrono::NaiveDate)>,
    ) -> Result<Vec<crate::service::SaleRecord>, StoreError> {
        sales::list_sales(self.read_pool(), range).await
    }

    async fn count_sales(&self) -> Result<i64, StoreError> {
        sales::count_sales(self.read_pool()).await
    }

    async fn replace_sales(
        &self,
        rows: Vec<crate::service::NewSaleRecord>,
    ) -> Result<u64, StoreError> {
        sales::replace_sales(self.write_pool(), rows).await
    }

    async fn replace_noos_results(
        &self,
        rows: Vec<crate::service::NewNoosResult>,
    ) -> Result<u64, StoreError> {
        noos::replace_noos_results(self.write_pool(), rows).await
    }

    async fn list_noos_results(
        &self,
        run_id: Option<i64>,
    ) -> Result<Vec<crate::service::NoosResult>, StoreError> {
        noos::list_noos_results(self.read_pool(), run_id).await
    }

    async fn latest_noos_run_id(&self) -> Result<Option<i64>, StoreError> {
        noos::latest_noos_run_id(self.read_pool()).await
    }

    async fn recent_noos_run_ids(&self, limit: usize) -> Result<Vec<i64>, StoreError> {
        noos::recent_noos_run_ids(self.read_pool(), limit).await
    }

    async fn get_parameters(
        &self,
        name: &str,
    ) -> Result<Option<crate::service::AlgorithmParameters>, StoreError> {
        params::get_parameters(self.read_pool(), name).await
    }

    async fn list_parameters(
        &self,
    ) -> Result<Vec<crate::service::AlgorithmParameters>, StoreError> {
        params::list_parameters(self.read_pool()).await
    }

    async fn upsert_parameters(
        &self,
        parameters: crate::service::AlgorithmParameters,
    ) -> Result<crate::service::AlgorithmParameters, StoreError> {
        params::upsert_parameters(self.write_pool(), parameters).await
    }

    async fn activate_parameters(
        &self,
        name: &str,
    ) -> Result<crate::service::AlgorithmParameters, StoreError> {
        params::activate_parameters(self.write_pool(), name).await
    }

    async fn active_parameters(
        &self,
    ) -> Result<Option<crate::service::AlgorithmParameters>, StoreError> {
        params::active_parameters(self.read_pool()).await
    }

    async fn record_audit(
        &self,
        entries: Vec<crate::service::NewAuditEntry>,
    ) -> Result<(), StoreError> {
        params::record_audit(self.write_pool(), entries).await
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<crate::service::AuditEntry>, StoreError> {
        params::list_audit(self.read_pool(), limit).await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        params::clear_all(self.write_pool()).await
    }
}

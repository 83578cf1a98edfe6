use chrono::NaiveDate;

use crate::{
    api::ErrorModel,
    service::{
        AuditEntry, NewAuditEntry, NewNoosResult, NewSaleRecord, NewSku, NewStore, NewStyle,
        NoosResult, SaleRecord, Sku, Store, Style, noos::AlgorithmParameters,
    },
};

/// Errors surfaced by store implementations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },
    #[error("{0}")]
    Conflict(String),
    #[error("database integrity error: {0}")]
    Integrity(String),
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StoreError {
    pub fn backend(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(e))
    }

    #[must_use]
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }
}

impl From<StoreError> for ErrorModel {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { .. } => {
                ErrorModel::not_found(value.to_string(), "NotFound", Some(Box::new(value)))
            }
            StoreError::Conflict(_) => {
                ErrorModel::conflict(value.to_string(), "Conflict", Some(Box::new(value)))
            }
            StoreError::Integrity(_) => ErrorModel::internal(
                value.to_string(),
                "DatabaseIntegrityError",
                Some(Box::new(value)),
            ),
            StoreError::Backend(_) => {
                ErrorModel::internal(value.to_string(), "StoreBackendError", Some(Box::new(value)))
            }
        }
    }
}

/// Typed queries and persistence for master data, sales, NOOS results,
/// parameter sets and the audit log. Implementations must be safe to call
/// from multiple workers concurrently.
#[async_trait::async_trait]
pub trait RetailStore: Send + Sync + std::fmt::Debug {
    // ------ styles ------
    async fn list_styles(&self) -> Result<Vec<Style>, StoreError>;
    /// Lookup by natural key; codes not present are absent from the result.
    async fn find_styles_by_codes(&self, codes: &[String]) -> Result<Vec<Style>, StoreError>;
    /// Applies one upload's upsert batch: inserts plus full-row updates
    /// (addressed by `id`), in a single transaction.
    async fn apply_style_batch(
        &self,
        inserts: Vec<NewStyle>,
        updates: Vec<Style>,
    ) -> Result<(), StoreError>;

    // ------ skus ------
    async fn list_skus(&self) -> Result<Vec<Sku>, StoreError>;
    async fn find_skus_by_codes(&self, codes: &[String]) -> Result<Vec<Sku>, StoreError>;
    async fn apply_sku_batch(
        &self,
        inserts: Vec<NewSku>,
        updates: Vec<Sku>,
    ) -> Result<(), StoreError>;

    // ------ stores ------
    async fn list_stores(&self) -> Result<Vec<Store>, StoreError>;
    async fn find_stores_by_branches(&self, branches: &[String]) -> Result<Vec<Store>, StoreError>;
    async fn apply_store_batch(
        &self,
        inserts: Vec<NewStore>,
        updates: Vec<Store>,
    ) -> Result<(), StoreError>;

    // ------ sales ------
    /// All sales, optionally restricted to an inclusive date range.
    async fn list_sales(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<SaleRecord>, StoreError>;
    async fn count_sales(&self) -> Result<i64, StoreError>;
    /// Complete replacement: truncate, then batch-insert, in one transaction.
    async fn replace_sales(&self, rows: Vec<NewSaleRecord>) -> Result<u64, StoreError>;

    // ------ noos results ------
    /// Whole-table replacement of the result set, in one transaction.
    async fn replace_noos_results(&self, rows: Vec<NewNoosResult>) -> Result<u64, StoreError>;
    async fn list_noos_results(&self, run_id: Option<i64>) -> Result<Vec<NoosResult>, StoreError>;
    async fn latest_noos_run_id(&self) -> Result<Option<i64>, StoreError>;
    async fn recent_noos_run_ids(&self, limit: usize) -> Result<Vec<i64>, StoreError>;

    // ------ algorithm parameters ------
    async fn get_parameters(&self, name: &str) -> Result<Option<AlgorithmParameters>, StoreError>;
    async fn list_parameters(&self) -> Result<Vec<AlgorithmParameters>, StoreError>;
    /// Insert or replace the set addressed by `parameter_set`.
    async fn upsert_parameters(
        &self,
        params: AlgorithmParameters,
    ) -> Result<AlgorithmParameters, StoreError>;
    /// Activate one set and deactivate all others atomically.
    async fn activate_parameters(&self, name: &str) -> Result<AlgorithmParameters, StoreError>;
    async fn active_parameters(&self) -> Result<Option<AlgorithmParameters>, StoreError>;

    // ------ audit ------
    async fn record_audit(&self, entries: Vec<NewAuditEntry>) -> Result<(), StoreError>;
    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;

    // ------ admin ------
    /// Fresh-start purge in foreign-key-safe order (sales, skus, styles,
    /// stores, tasks, noos results) with identity counters reset, in one
    /// transaction. Parameter sets and the audit log survive.
    async fn clear_all(&self) -> Result<(), StoreError>;
}

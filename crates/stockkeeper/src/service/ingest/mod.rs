//! The upload pipeline: parse, field-validate, resolve foreign keys, detect
//! in-file duplicates, then upsert (master data) or truncate-replace
//! (sales). Per-row failures are collected, never thrown; any validation or
//! duplicate error aborts the upload with zero rows persisted.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::Utc;

use crate::{
    CONFIG,
    api::ErrorModel,
    service::{
        AuditAction, NewAuditEntry, NewSaleRecord, NewSku, NewStore, NewStyle, RetailStore,
        store::StoreError,
        tasks::{TaskHandle, TaskKind},
    },
};

pub mod report;
pub mod tsv;
pub mod validate;

pub use report::{ErrorArtifacts, ErrorSummary, ErrorTracker, RowErrorKind, UploadResponse};
pub use tsv::{ParsedTsv, TsvParseError, TsvRow};

pub const STYLES_HEADERS: &[&str] = &["style", "brand", "category", "sub_category", "mrp", "gender"];
pub const SKUS_HEADERS: &[&str] = &["sku", "style", "size"];
pub const STORES_HEADERS: &[&str] = &["branch", "city"];
pub const SALES_HEADERS: &[&str] = &["day", "sku", "channel", "quantity", "discount", "revenue"];

const WARNING_LIMIT: usize = 20;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum UploadKind {
    Styles,
    Stores,
    Skus,
    Sales,
}

impl UploadKind {
    #[must_use]
    pub fn headers(self) -> &'static [&'static str] {
        match self {
            UploadKind::Styles => STYLES_HEADERS,
            UploadKind::Stores => STORES_HEADERS,
            UploadKind::Skus => SKUS_HEADERS,
            UploadKind::Sales => SALES_HEADERS,
        }
    }

    #[must_use]
    pub fn task_kind(self) -> TaskKind {
        match self {
            UploadKind::Styles => TaskKind::StylesUpload,
            UploadKind::Stores => TaskKind::StoresUpload,
            UploadKind::Skus => TaskKind::SkusUpload,
            UploadKind::Sales => TaskKind::SalesUpload,
        }
    }
}

/// Result of a pipeline run. `Cancelled` is only produced when a task
/// handle was supplied and its flag was observed at a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Done(UploadResponse),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn RetailStore>,
}

enum Candidates {
    Styles(Vec<NewStyle>),
    Stores(Vec<NewStore>),
    Skus(Vec<NewSku>),
    Sales(Vec<NewSaleRecord>),
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(store: Arc<dyn RetailStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, bytes, handle), fields(bytes = bytes.len()))]
    pub async fn run(
        &self,
        kind: UploadKind,
        bytes: &[u8],
        handle: Option<&TaskHandle>,
    ) -> Result<UploadOutcome, ErrorModel> {
        // Cancellation checkpoint (a): before parsing.
        if cancelled(handle).await? {
            return Ok(UploadOutcome::Cancelled);
        }
        report(handle, 10.0, "validating", None, None).await?;

        let parsed = match tsv::parse(bytes, kind.headers(), CONFIG.upload_row_limit) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::info!("Rejecting {kind} upload: {e}");
                return Ok(UploadOutcome::Done(UploadResponse::rejected(e.to_string())));
            }
        };
        report(handle, 20.0, "parsing", None, None).await?;
        let total_rows = parsed.rows.len();
        report(
            handle,
            40.0,
            &format!("parsed {total_rows} rows"),
            None,
            Some(total_rows as i64),
        )
        .await?;

        // Cancellation checkpoint (b): after parsing.
        if cancelled(handle).await? {
            return Ok(UploadOutcome::Cancelled);
        }
        report(handle, 50.0, "processing", None, None).await?;

        let mut tracker = ErrorTracker::new();
        let candidates = match kind {
            UploadKind::Styles => Candidates::Styles(build_styles(&parsed, &mut tracker)),
            UploadKind::Stores => Candidates::Stores(build_stores(&parsed, &mut tracker)),
            UploadKind::Skus => Candidates::Skus(self.build_skus(&parsed, &mut tracker).await?),
            UploadKind::Sales => Candidates::Sales(self.build_sales(&parsed, &mut tracker).await?),
        };

        let header_line = kind.headers().join("\t");
        let artifact_key = artifact_key(kind, handle);

        if tracker.has_fatal() {
            let error_files = tracker
                .write_artifacts(&CONFIG.artifact_dir, &artifact_key, &header_line)
                .await
                .map_err(|e| {
                    ErrorModel::internal(
                        "Failed to write upload error artifacts",
                        "ArtifactWriteError",
                        Some(Box::new(e)),
                    )
                })?;
            let fatal = tracker.fatal_count();
            tracing::info!("Aborting {kind} upload: {fatal} rejected rows");
            return Ok(UploadOutcome::Done(UploadResponse {
                success: false,
                message: format!("Upload rejected: {fatal} invalid rows, nothing was persisted"),
                errors: tracker.messages_of(RowErrorKind::ValidationError, WARNING_LIMIT),
                warnings: tracker.messages_of(RowErrorKind::DependencySkipped, WARNING_LIMIT),
                record_count: 0,
                error_count: fatal,
                skipped_count: tracker.skipped_count(),
                error_summary: Some(tracker.summary()),
                error_files,
                ..UploadResponse::default()
            }));
        }

        // Cancellation checkpoint (c): before persistence. Nothing has been
        // written yet, so a cancelled upload leaves the store untouched.
        if cancelled(handle).await? {
            return Ok(UploadOutcome::Cancelled);
        }
        report(handle, 80.0, "persisting", None, None).await?;

        let (record_count, messages) = match candidates {
            Candidates::Styles(rows) => self.persist_styles(rows).await?,
            Candidates::Stores(rows) => self.persist_stores(rows).await?,
            Candidates::Skus(rows) => self.persist_skus(rows).await?,
            Candidates::Sales(rows) => self.persist_sales(rows).await?,
        };

        let error_files = tracker
            .write_artifacts(&CONFIG.artifact_dir, &artifact_key, &header_line)
            .await
            .map_err(|e| {
                ErrorModel::internal(
                    "Failed to write upload error artifacts",
                    "ArtifactWriteError",
                    Some(Box::new(e)),
                )
            })?;

        report(handle, 95.0, "complete", Some(record_count as i64), None).await?;
        tracing::info!(
            records = record_count,
            skipped = tracker.skipped_count(),
            "{kind} upload complete"
        );
        Ok(UploadOutcome::Done(UploadResponse {
            success: true,
            message: format!("{kind} upload completed: {record_count} records processed"),
            messages,
            warnings: tracker.messages_of(RowErrorKind::DependencySkipped, WARNING_LIMIT),
            record_count,
            error_count: 0,
            skipped_count: tracker.skipped_count(),
            error_summary: (!tracker.is_empty()).then(|| tracker.summary()),
            error_files,
            ..UploadResponse::default()
        }))
    }

    async fn build_skus(
        &self,
        parsed: &ParsedTsv,
        tracker: &mut ErrorTracker,
    ) -> Result<Vec<NewSku>, ErrorModel> {
        struct SkuRow {
            line_number: usize,
            raw: String,
            sku: String,
            style_code: String,
            size: String,
        }

        let mut valid = Vec::new();
        for row in &parsed.rows {
            let sku = parsed.field(row, "sku");
            let style = parsed.field(row, "style");
            let size = parsed.field(row, "size");

            let mut errors = Vec::new();
            collect(&mut errors, validate::validate_code(sku, "sku"));
            collect(&mut errors, validate::validate_code(style, "style"));
            collect(&mut errors, validate::validate_size(size, "size"));
            if !errors.is_empty() {
                tracker.record(
                    row.line_number,
                    &row.raw,
                    RowErrorKind::ValidationError,
                    errors.join("; "),
                );
                continue;
            }
            valid.push(SkuRow {
                line_number: row.line_number,
                raw: row.raw.clone(),
                sku: sku.to_uppercase(),
                style_code: style.to_uppercase(),
                size: size.to_string(),
            });
        }

        let style_codes: Vec<String> = valid
            .iter()
            .map(|r| r.style_code.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let styles_by_code: HashMap<String, i64> = self
            .store
            .find_styles_by_codes(&style_codes)
            .await?
            .into_iter()
            .map(|s| (s.style_code, s.id))
            .collect();

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in valid {
            let Some(&style_id) = styles_by_code.get(&row.style_code) else {
                tracker.record(
                    row.line_number,
                    &row.raw,
                    RowErrorKind::DependencySkipped,
                    format!("style `{}` not found", row.style_code),
                );
                continue;
            };
            if !seen.insert(row.sku.clone()) {
                tracker.record(
                    row.line_number,
                    &row.raw,
                    RowErrorKind::DuplicateError,
                    format!("Duplicate sku in file: {}", row.sku),
                );
                continue;
            }
            out.push(NewSku {
                sku: row.sku,
                style_id,
                size: row.size,
            });
        }
        Ok(out)
    }

    async fn build_sales(
        &self,
        parsed: &ParsedTsv,
        tracker: &mut ErrorTracker,
    ) -> Result<Vec<NewSaleRecord>, ErrorModel> {
        struct SaleRow {
            line_number: usize,
            raw: String,
            day: chrono::NaiveDate,
            sku: String,
            channel: String,
            quantity: i64,
            discount: rust_decimal::Decimal,
            revenue: rust_decimal::Decimal,
        }

        let mut valid = Vec::new();
        for row in &parsed.rows {
            let day = parsed.field(row, "day");
            let sku = parsed.field(row, "sku");
            let channel = parsed.field(row, "channel");
            let quantity = parsed.field(row, "quantity");
            let discount = parsed.field(row, "discount");
            let revenue = parsed.field(row, "revenue");

            let mut errors = Vec::new();
            let day = take(&mut errors, validate::validate_day(day, "day"));
            collect(&mut errors, validate::validate_code(sku, "sku"));
            collect(&mut errors, validate::validate_code(channel, "channel"));
            let quantity = take(&mut errors, validate::validate_quantity(quantity, "quantity"));
            let discount = take(&mut errors, validate::validate_amount(discount, "discount"));
            let revenue = take(&mut errors, validate::validate_amount(revenue, "revenue"));
            if !errors.is_empty() {
                tracker.record(
                    row.line_number,
                    &row.raw,
                    RowErrorKind::ValidationError,
                    errors.join("; "),
                );
                continue;
            }
            let (Some(day), Some(quantity), Some(discount), Some(revenue)) =
                (day, quantity, discount, revenue)
            else {
                continue;
            };
            valid.push(SaleRow {
                line_number: row.line_number,
                raw: row.raw.clone(),
                day,
                sku: sku.to_uppercase(),
                channel: channel.to_uppercase(),
                quantity,
                discount,
                revenue,
            });
        }

        let sku_codes: Vec<String> = valid
            .iter()
            .map(|r| r.sku.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let skus_by_code: HashMap<String, i64> = self
            .store
            .find_skus_by_codes(&sku_codes)
            .await?
            .into_iter()
            .map(|s| (s.sku, s.id))
            .collect();

        let branches: Vec<String> = valid
            .iter()
            .map(|r| r.channel.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let stores_by_branch: HashMap<String, i64> = self
            .store
            .find_stores_by_branches(&branches)
            .await?
            .into_iter()
            .map(|s| (s.branch, s.id))
            .collect();

        let mut out = Vec::new();
        for row in valid {
            let Some(&sku_id) = skus_by_code.get(&row.sku) else {
                tracker.record(
                    row.line_number,
                    &row.raw,
                    RowErrorKind::DependencySkipped,
                    format!("sku `{}` not found", row.sku),
                );
                continue;
            };
            let Some(&store_id) = stores_by_branch.get(&row.channel) else {
                tracker.record(
                    row.line_number,
                    &row.raw,
                    RowErrorKind::DependencySkipped,
                    format!("store branch `{}` not found", row.channel),
                );
                continue;
            };
            out.push(NewSaleRecord {
                day: row.day,
                sku_id,
                store_id,
                quantity: row.quantity,
                discount: row.discount,
                revenue: row.revenue,
            });
        }
        Ok(out)
    }

    async fn persist_styles(
        &self,
        rows: Vec<NewStyle>,
    ) -> Result<(usize, Vec<String>), ErrorModel> {
        let record_count = rows.len();
        let codes: Vec<String> = rows.iter().map(|r| r.style_code.clone()).collect();
        let existing: HashMap<String, crate::service::Style> = self
            .store
            .find_styles_by_codes(&codes)
            .await?
            .into_iter()
            .map(|s| (s.style_code.clone(), s))
            .collect();

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut audits = Vec::new();
        let mut unchanged = 0usize;
        for row in rows {
            match existing.get(&row.style_code) {
                Some(current) => match current.diff(&row) {
                    Some(details) => {
                        let mut updated = current.clone();
                        updated.brand = row.brand;
                        updated.category = row.category;
                        updated.sub_category = row.sub_category;
                        updated.mrp = row.mrp;
                        updated.gender = row.gender;
                        audits.push(NewAuditEntry::system(
                            "style",
                            current.style_code.clone(),
                            AuditAction::Update,
                            details,
                        ));
                        updates.push(updated);
                    }
                    None => unchanged += 1,
                },
                None => {
                    audits.push(NewAuditEntry::system(
                        "style",
                        row.style_code.clone(),
                        AuditAction::Insert,
                        format!("New style created: {}", row.style_code),
                    ));
                    inserts.push(row);
                }
            }
        }
        let message = format!(
            "Styles: {} inserted, {} updated, {unchanged} unchanged",
            inserts.len(),
            updates.len()
        );
        self.store.apply_style_batch(inserts, updates).await?;
        self.store.record_audit(audits).await?;
        Ok((record_count, vec![message]))
    }

    async fn persist_skus(&self, rows: Vec<NewSku>) -> Result<(usize, Vec<String>), ErrorModel> {
        let record_count = rows.len();
        let codes: Vec<String> = rows.iter().map(|r| r.sku.clone()).collect();
        let existing: HashMap<String, crate::service::Sku> = self
            .store
            .find_skus_by_codes(&codes)
            .await?
            .into_iter()
            .map(|s| (s.sku.clone(), s))
            .collect();

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut audits = Vec::new();
        let mut unchanged = 0usize;
        for row in rows {
            match existing.get(&row.sku) {
                Some(current) => match current.diff(&row) {
                    Some(details) => {
                        let mut updated = current.clone();
                        updated.style_id = row.style_id;
                        updated.size = row.size;
                        audits.push(NewAuditEntry::system(
                            "sku",
                            current.sku.clone(),
                            AuditAction::Update,
                            details,
                        ));
                        updates.push(updated);
                    }
                    None => unchanged += 1,
                },
                None => {
                    audits.push(NewAuditEntry::system(
                        "sku",
                        row.sku.clone(),
                        AuditAction::Insert,
                        format!("New sku created: {}", row.sku),
                    ));
                    inserts.push(row);
                }
            }
        }
        let message = format!(
            "SKUs: {} inserted, {} updated, {unchanged} unchanged",
            inserts.len(),
            updates.len()
        );
        self.store.apply_sku_batch(inserts, updates).await?;
        self.store.record_audit(audits).await?;
        Ok((record_count, vec![message]))
    }

    async fn persist_stores(
        &self,
        rows: Vec<NewStore>,
    ) -> Result<(usize, Vec<String>), ErrorModel> {
        let record_count = rows.len();
        let branches: Vec<String> = rows.iter().map(|r| r.branch.clone()).collect();
        let existing: HashMap<String, crate::service::Store> = self
            .store
            .find_stores_by_branches(&branches)
            .await?
            .into_iter()
            .map(|s| (s.branch.clone(), s))
            .collect();

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut audits = Vec::new();
        let mut unchanged = 0usize;
        for row in rows {
            match existing.get(&row.branch) {
                Some(current) => match current.diff(&row) {
                    Some(details) => {
                        let mut updated = current.clone();
                        updated.city = row.city;
                        audits.push(NewAuditEntry::system(
                            "store",
                            current.branch.clone(),
                            AuditAction::Update,
                            details,
                        ));
                        updates.push(updated);
                    }
                    None => unchanged += 1,
                },
                None => {
                    audits.push(NewAuditEntry::system(
                        "store",
                        row.branch.clone(),
                        AuditAction::Insert,
                        format!("New store created: {}", row.branch),
                    ));
                    inserts.push(row);
                }
            }
        }
        let message = format!(
            "Stores: {} inserted, {} updated, {unchanged} unchanged",
            inserts.len(),
            updates.len()
        );
        self.store.apply_store_batch(inserts, updates).await?;
        self.store.record_audit(audits).await?;
        Ok((record_count, vec![message]))
    }

    async fn persist_sales(
        &self,
        rows: Vec<NewSaleRecord>,
    ) -> Result<(usize, Vec<String>), ErrorModel> {
        let removed = self.store.count_sales().await?;
        let inserted = self.store.replace_sales(rows).await?;
        self.store
            .record_audit(vec![
                NewAuditEntry::system(
                    "sales",
                    "*",
                    AuditAction::BulkDelete,
                    format!("Sales table cleared: {removed} rows removed"),
                ),
                NewAuditEntry::system(
                    "sales",
                    "*",
                    AuditAction::BulkInsert,
                    format!("Sales bulk insert: {inserted} rows"),
                ),
            ])
            .await?;
        Ok((
            usize::try_from(inserted).unwrap_or_default(),
            vec![format!(
                "Sales: replaced {removed} rows with {inserted} rows"
            )],
        ))
    }
}

fn build_styles(parsed: &ParsedTsv, tracker: &mut ErrorTracker) -> Vec<NewStyle> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in &parsed.rows {
        let style = parsed.field(row, "style");
        let brand = parsed.field(row, "brand");
        let category = parsed.field(row, "category");
        let sub_category = parsed.field(row, "sub_category");
        let mrp = parsed.field(row, "mrp");
        let gender = parsed.field(row, "gender");

        let mut errors = Vec::new();
        collect(&mut errors, validate::validate_code(style, "style"));
        collect(&mut errors, validate::validate_name(brand, "brand"));
        collect(&mut errors, validate::validate_name(category, "category"));
        collect(
            &mut errors,
            validate::validate_name(sub_category, "sub_category"),
        );
        let mrp = take(&mut errors, validate::validate_mrp(mrp, "mrp"));
        collect(&mut errors, validate::validate_gender(gender, "gender"));
        if !errors.is_empty() {
            tracker.record(
                row.line_number,
                &row.raw,
                RowErrorKind::ValidationError,
                errors.join("; "),
            );
            continue;
        }

        let Some(mrp) = mrp else {
            continue;
        };

        let code = style.to_uppercase();
        if !seen.insert(code.clone()) {
            tracker.record(
                row.line_number,
                &row.raw,
                RowErrorKind::DuplicateError,
                format!("Duplicate style in file: {code}"),
            );
            continue;
        }
        out.push(NewStyle {
            style_code: code,
            brand: brand.to_string(),
            category: category.to_string(),
            sub_category: sub_category.to_string(),
            mrp,
            gender: gender.to_string(),
        });
    }
    out
}

fn build_stores(parsed: &ParsedTsv, tracker: &mut ErrorTracker) -> Vec<NewStore> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in &parsed.rows {
        let branch = parsed.field(row, "branch");
        let city = parsed.field(row, "city");

        let mut errors = Vec::new();
        collect(&mut errors, validate::validate_code(branch, "branch"));
        collect(&mut errors, validate::validate_name(city, "city"));
        if !errors.is_empty() {
            tracker.record(
                row.line_number,
                &row.raw,
                RowErrorKind::ValidationError,
                errors.join("; "),
            );
            continue;
        }

        let branch = branch.to_uppercase();
        if !seen.insert(branch.clone()) {
            tracker.record(
                row.line_number,
                &row.raw,
                RowErrorKind::DuplicateError,
                format!("Duplicate branch in file: {branch}"),
            );
            continue;
        }
        out.push(NewStore {
            branch,
            city: city.to_string(),
        });
    }
    out
}

fn collect(errors: &mut Vec<String>, result: Result<(), String>) {
    if let Err(e) = result {
        errors.push(e);
    }
}

fn take<T>(errors: &mut Vec<String>, result: Result<T, String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn artifact_key(kind: UploadKind, handle: Option<&TaskHandle>) -> String {
    let id = handle.map_or_else(|| "sync".to_string(), |h| h.id().to_string());
    format!("{kind}_{id}_{}", Utc::now().format("%Y%m%d%H%M%S%3f"))
}

async fn cancelled(handle: Option<&TaskHandle>) -> Result<bool, StoreError> {
    match handle {
        Some(handle) => handle.cancellation_requested().await,
        None => Ok(false),
    }
}

async fn report(
    handle: Option<&TaskHandle>,
    progress: f32,
    phase: &str,
    processed: Option<i64>,
    total: Option<i64>,
) -> Result<(), StoreError> {
    match handle {
        Some(handle) => handle.report(progress, phase, processed, total).await,
        None => Ok(()),
    }
}

//! Streams store queries into tab-separated result files. Download formats
//! mirror the upload formats so an upload/download round trip is stable;
//! NOOS results get their own extended header.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;

use crate::{
    CONFIG,
    api::ErrorModel,
    service::{
        RetailStore,
        ingest::{SALES_HEADERS, SKUS_HEADERS, STORES_HEADERS, STYLES_HEADERS},
        tasks::{TaskId, TaskKind},
    },
};

pub const NOOS_DOWNLOAD_HEADERS: &str = "Category\tStyle Code\tStyle ROS\tType\tStyle Rev Contri\tTotal Quantity\tTotal Revenue\tDays Available\tDays With Sales\tAvg Discount\tCalculated Date";

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
pub enum DownloadKind {
    Styles,
    Stores,
    Skus,
    Sales,
    Noos,
}

impl DownloadKind {
    #[must_use]
    pub fn task_kind(self) -> TaskKind {
        match self {
            DownloadKind::Styles => TaskKind::StylesDownload,
            DownloadKind::Stores => TaskKind::StoresDownload,
            DownloadKind::Skus => TaskKind::SkusDownload,
            DownloadKind::Sales => TaskKind::SalesDownload,
            DownloadKind::Noos => TaskKind::NoosDownload,
        }
    }
}

/// An in-memory rendering, served directly by the synchronous endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDownload {
    pub file_name: String,
    pub content: String,
    /// Data rows, excluding the header line.
    pub rows: usize,
}

/// A rendering written to the artifact directory for an async task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub path: String,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct DownloadBuilder {
    store: Arc<dyn RetailStore>,
}

impl DownloadBuilder {
    #[must_use]
    pub fn new(store: Arc<dyn RetailStore>) -> Self {
        Self { store }
    }

    /// `run_id` only applies to NOOS downloads; absent means the latest run.
    #[tracing::instrument(skip(self))]
    pub async fn render(
        &self,
        kind: DownloadKind,
        run_id: Option<i64>,
    ) -> Result<RenderedDownload, ErrorModel> {
        let mut lines: Vec<String> = Vec::new();
        match kind {
            DownloadKind::Styles => {
                lines.push(STYLES_HEADERS.join("\t"));
                for style in self.store.list_styles().await? {
                    lines.push(format!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        style.style_code,
                        style.brand,
                        style.category,
                        style.sub_category,
                        style.mrp,
                        style.gender
                    ));
                }
            }
            DownloadKind::Stores => {
                lines.push(STORES_HEADERS.join("\t"));
                for store in self.store.list_stores().await? {
                    lines.push(format!("{}\t{}", store.branch, store.city));
                }
            }
            DownloadKind::Skus => {
                lines.push(SKUS_HEADERS.join("\t"));
                let styles: HashMap<i64, String> = self
                    .store
                    .list_styles()
                    .await?
                    .into_iter()
                    .map(|s| (s.id, s.style_code))
                    .collect();
                for sku in self.store.list_skus().await? {
                    let style_code = styles.get(&sku.style_id).cloned().unwrap_or_default();
                    lines.push(format!("{}\t{}\t{}", sku.sku, style_code, sku.size));
                }
            }
            DownloadKind::Sales => {
                lines.push(SALES_HEADERS.join("\t"));
                let skus: HashMap<i64, String> = self
                    .store
                    .list_skus()
                    .await?
                    .into_iter()
                    .map(|s| (s.id, s.sku))
                    .collect();
                let stores: HashMap<i64, String> = self
                    .store
                    .list_stores()
                    .await?
                    .into_iter()
                    .map(|s| (s.id, s.branch))
                    .collect();
                for sale in self.store.list_sales(None).await? {
                    lines.push(format!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        sale.day,
                        skus.get(&sale.sku_id).cloned().unwrap_or_default(),
                        stores.get(&sale.store_id).cloned().unwrap_or_default(),
                        sale.quantity,
                        sale.discount,
                        sale.revenue
                    ));
                }
            }
            DownloadKind::Noos => {
                lines.push(NOOS_DOWNLOAD_HEADERS.to_string());
                let run_id = match run_id {
                    Some(run_id) => run_id,
                    None => self.store.latest_noos_run_id().await?.ok_or_else(|| {
                        ErrorModel::not_found("No NOOS results available", "NoNoosResults", None)
                    })?,
                };
                for result in self.store.list_noos_results(Some(run_id)).await? {
                    lines.push(format!(
                        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                        result.category,
                        result.style_code,
                        result.style_ros,
                        result.r#type,
                        result.style_rev_contribution,
                        result.total_quantity_sold,
                        result.total_revenue,
                        result.days_available,
                        result.days_with_sales,
                        result.avg_discount,
                        result.calculated_at.format("%Y-%m-%d")
                    ));
                }
            }
        }

        let rows = lines.len() - 1;
        let mut content = lines.join("\n");
        content.push('\n');
        Ok(RenderedDownload {
            file_name: format!("{kind}.tsv"),
            content,
            rows,
        })
    }

    /// Renders and writes the file for an async download task. The absolute
    /// path lands in `task.result_path`; the task completes with
    /// `processed_records` equal to the data row count.
    #[tracing::instrument(skip(self))]
    pub async fn build_file(
        &self,
        kind: DownloadKind,
        run_id: Option<i64>,
        task_id: TaskId,
    ) -> Result<DownloadArtifact, ErrorModel> {
        let rendered = self.render(kind, run_id).await?;
        let dir = &CONFIG.artifact_dir;
        tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
        let path = dir.join(format!(
            "{kind}_{task_id}_{}.tsv",
            Utc::now().format("%Y%m%d%H%M%S%3f")
        ));
        tokio::fs::write(&path, rendered.content)
            .await
            .map_err(io_error)?;
        Ok(DownloadArtifact {
            path: path.to_string_lossy().into_owned(),
            rows: rendered.rows,
        })
    }
}

fn io_error(e: std::io::Error) -> ErrorModel {
    ErrorModel::internal(
        "Failed to write download artifact",
        "ArtifactWriteError",
        Some(Box::new(e)),
    )
}

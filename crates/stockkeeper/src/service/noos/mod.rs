//! The NOOS classification engine: liquidation cleanup, per-style
//! aggregation, category benchmarking and rule-based classification into
//! core / bestseller / fashion, followed by whole-table replacement of the
//! previous run's results.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use chrono::{NaiveDate, Utc};
use itertools::Itertools as _;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive as _};
use serde::{Deserialize, Serialize};

use crate::{
    CONFIG, DaysAvailablePolicy,
    api::ErrorModel,
    service::{
        NewNoosResult, NoosType, RetailStore,
        store::StoreError,
        tasks::{TaskHandle, TaskId},
    },
};

mod params;

pub use params::{AlgorithmParameters, DEFAULT_PARAMETER_SET, seed_default_parameters};

const ROUND_DP: u32 = 4;
/// Core classification additionally requires the average discount share to
/// stay under this.
const CORE_MAX_DISCOUNT_RATIO: f64 = 0.15;
/// Cancellation check interval during classification.
const CANCEL_CHECK_INTERVAL: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoosRunSummary {
    pub sales_loaded: usize,
    pub sales_analyzed: usize,
    pub styles_classified: usize,
    pub categories: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoosRunOutcome {
    Completed(NoosRunSummary),
    Cancelled,
}

struct StyleAgg {
    category: String,
    style_code: String,
    quantity: i64,
    revenue: Decimal,
    discount: Decimal,
    days: BTreeSet<NaiveDate>,
}

struct CategoryBench {
    total_revenue: Decimal,
    avg_revenue_per_day: f64,
    avg_consistency: f64,
}

#[derive(Debug, Clone)]
pub struct NoosEngine {
    store: Arc<dyn RetailStore>,
}

impl NoosEngine {
    #[must_use]
    pub fn new(store: Arc<dyn RetailStore>) -> Self {
        Self { store }
    }

    /// Executes one full run and stamps every produced row with `run_id`.
    /// Cancellation is honoured between phases and every 50 styles during
    /// classification; a cancelled run persists nothing.
    #[tracing::instrument(skip(self, parameters, handle), fields(run_id = %run_id))]
    pub async fn run(
        &self,
        parameters: &AlgorithmParameters,
        run_id: TaskId,
        handle: Option<&TaskHandle>,
    ) -> Result<NoosRunOutcome, ErrorModel> {
        parameters.validate()?;
        let policy = parameters
            .days_available_policy
            .unwrap_or(CONFIG.noos.days_available_policy);

        // Phase 1: load sales, optionally windowed.
        if cancelled(handle).await? {
            return Ok(NoosRunOutcome::Cancelled);
        }
        report(handle, 5.0, "loading sales").await?;
        let range = match (parameters.analysis_start_date, parameters.analysis_end_date) {
            (None, None) => None,
            (start, end) => Some((
                start.unwrap_or(NaiveDate::MIN),
                end.unwrap_or(NaiveDate::MAX),
            )),
        };
        let sales = self.store.list_sales(range).await?;
        if sales.is_empty() {
            return Err(ErrorModel::bad_request(
                "No sales data in range",
                "NoSalesData",
                None,
            ));
        }
        let sales_loaded = sales.len();
        report(handle, 20.0, &format!("loaded {sales_loaded} sales")).await?;

        // Phase 2: liquidation cleanup. Clearance-heavy sales would distort
        // the style metrics, so they are dropped up front.
        if cancelled(handle).await? {
            return Ok(NoosRunOutcome::Cancelled);
        }
        let threshold = parameters.liquidation_threshold;
        let sales: Vec<_> = sales
            .into_iter()
            .filter(|sale| {
                if sale.revenue <= Decimal::ZERO {
                    return false;
                }
                discount_share(sale.discount, sale.revenue) <= threshold
            })
            .collect();
        let sales_analyzed = sales.len();
        report(
            handle,
            35.0,
            &format!("liquidation cleanup kept {sales_analyzed} of {sales_loaded} sales"),
        )
        .await?;

        // Phase 3: aggregate by style through in-memory lookup maps; no
        // per-row store hits.
        if cancelled(handle).await? {
            return Ok(NoosRunOutcome::Cancelled);
        }
        let sku_to_style: HashMap<i64, i64> = self
            .store
            .list_skus()
            .await?
            .into_iter()
            .map(|sku| (sku.id, sku.style_id))
            .collect();
        let styles: HashMap<i64, (String, String)> = self
            .store
            .list_styles()
            .await?
            .into_iter()
            .map(|style| (style.id, (style.category, style.style_code)))
            .collect();

        let mut aggs: BTreeMap<i64, StyleAgg> = BTreeMap::new();
        let mut min_day = NaiveDate::MAX;
        let mut max_day = NaiveDate::MIN;
        for sale in &sales {
            let Some(style_id) = sku_to_style.get(&sale.sku_id) else {
                tracing::debug!(sku_id = sale.sku_id, "Sale references unknown sku, skipping");
                continue;
            };
            let Some((category, style_code)) = styles.get(style_id) else {
                tracing::debug!(style_id, "Sku references unknown style, skipping");
                continue;
            };
            let agg = aggs.entry(*style_id).or_insert_with(|| StyleAgg {
                category: category.clone(),
                style_code: style_code.clone(),
                quantity: 0,
                revenue: Decimal::ZERO,
                discount: Decimal::ZERO,
                days: BTreeSet::new(),
            });
            agg.quantity += sale.quantity;
            agg.revenue += sale.revenue;
            agg.discount += sale.discount;
            agg.days.insert(sale.day);
            min_day = min_day.min(sale.day);
            max_day = max_day.max(sale.day);
        }
        report(handle, 50.0, &format!("aggregated {} styles", aggs.len())).await?;

        let window_days = analysis_window_days(parameters, min_day, max_day);
        let days_available = |agg: &StyleAgg| -> i64 {
            match policy {
                DaysAvailablePolicy::ObservedDays => (agg.days.len() as i64).max(1),
                DaysAvailablePolicy::AnalysisWindow => window_days,
            }
        };

        // Phase 4: category benchmarks.
        if cancelled(handle).await? {
            return Ok(NoosRunOutcome::Cancelled);
        }
        let mut benchmarks: BTreeMap<String, CategoryBench> = BTreeMap::new();
        let grouped: HashMap<&str, Vec<&StyleAgg>> = aggs
            .values()
            .map(|agg| (agg.category.as_str(), agg))
            .into_group_map();
        for (category, members) in &grouped {
            let total_revenue: Decimal = members.iter().map(|a| a.revenue).sum();
            let count = members.len() as f64;
            let avg_revenue_per_day = members
                .iter()
                .map(|a| per_day(a.revenue, days_available(a)))
                .sum::<f64>()
                / count;
            let avg_consistency = members
                .iter()
                .map(|a| a.days.len() as f64 / days_available(a) as f64)
                .sum::<f64>()
                / count;
            benchmarks.insert(
                (*category).to_string(),
                CategoryBench {
                    total_revenue,
                    avg_revenue_per_day,
                    avg_consistency,
                },
            );
        }
        report(handle, 55.0, &format!("benchmarked {} categories", benchmarks.len())).await?;

        // Phase 5: classify. First matching rule wins.
        let calculated_at = Utc::now();
        let mut results = Vec::with_capacity(aggs.len());
        for (index, agg) in aggs.values().enumerate() {
            if index % CANCEL_CHECK_INTERVAL == 0 {
                if cancelled(handle).await? {
                    return Ok(NoosRunOutcome::Cancelled);
                }
                let progress = 55.0 + 30.0 * (index as f32 / aggs.len().max(1) as f32);
                report(handle, progress, "classifying").await?;
            }
            let Some(bench) = benchmarks.get(&agg.category) else {
                continue;
            };
            let available = days_available(agg);
            let days_with_sales = agg.days.len() as i64;

            let revenue_per_day = per_day(agg.revenue, available);
            let consistency_ratio = days_with_sales as f64 / available as f64;
            let avg_discount_ratio = discount_share(agg.discount, agg.revenue);
            let quantity = agg.quantity as f64;

            let noos_type = if revenue_per_day
                > bench.avg_revenue_per_day * parameters.bestseller_multiplier
                && quantity > parameters.min_volume_threshold
            {
                NoosType::Bestseller
            } else if consistency_ratio > parameters.consistency_threshold
                && avg_discount_ratio < CORE_MAX_DISCOUNT_RATIO
                && quantity > parameters.min_volume_threshold / 2.0
            {
                NoosType::Core
            } else {
                NoosType::Fashion
            };

            let style_ros = round(Decimal::from(agg.quantity) / Decimal::from(available));
            let rev_contribution = if bench.total_revenue > Decimal::ZERO {
                round(agg.revenue / bench.total_revenue * Decimal::from(100))
            } else {
                Decimal::ZERO
            };
            let avg_discount = {
                let denominator = agg.discount + agg.revenue;
                if denominator > Decimal::ZERO {
                    round(agg.discount / denominator)
                } else {
                    Decimal::ZERO
                }
            };

            results.push(NewNoosResult {
                algorithm_run_id: *run_id,
                category: agg.category.clone(),
                style_code: agg.style_code.clone(),
                style_ros,
                r#type: noos_type,
                style_rev_contribution: rev_contribution,
                total_quantity_sold: agg.quantity,
                total_revenue: agg.revenue,
                days_available: available,
                days_with_sales,
                avg_discount,
                calculated_at,
            });
        }
        results.sort_by(|a, b| {
            (a.category.as_str(), a.style_code.as_str())
                .cmp(&(b.category.as_str(), b.style_code.as_str()))
        });
        report(handle, 85.0, &format!("classified {} styles", results.len())).await?;

        // Phase 6: replace the previous run's results. A cancellation seen
        // here means nothing at all is persisted.
        if cancelled(handle).await? {
            return Ok(NoosRunOutcome::Cancelled);
        }
        let summary = NoosRunSummary {
            sales_loaded,
            sales_analyzed,
            styles_classified: results.len(),
            categories: benchmarks.len(),
        };
        self.store.replace_noos_results(results).await?;
        report(handle, 95.0, "persisted results").await?;
        tracing::info!(
            styles = summary.styles_classified,
            categories = summary.categories,
            "NOOS run complete"
        );
        Ok(NoosRunOutcome::Completed(summary))
    }
}

fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(ROUND_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn per_day(revenue: Decimal, days: i64) -> f64 {
    if days <= 0 {
        return 0.0;
    }
    (revenue / Decimal::from(days)).to_f64().unwrap_or(0.0)
}

fn discount_share(discount: Decimal, revenue: Decimal) -> f64 {
    let denominator = discount + revenue;
    if denominator <= Decimal::ZERO {
        return 0.0;
    }
    (discount / denominator).to_f64().unwrap_or(0.0)
}

/// Inclusive day count of the analysis window; open ends fall back to the
/// observed span of the loaded sales.
fn analysis_window_days(
    parameters: &AlgorithmParameters,
    min_day: NaiveDate,
    max_day: NaiveDate,
) -> i64 {
    if min_day > max_day {
        return 1;
    }
    let start = parameters.analysis_start_date.unwrap_or(min_day);
    let end = parameters.analysis_end_date.unwrap_or(max_day);
    ((end - start).num_days() + 1).max(1)
}

async fn cancelled(handle: Option<&TaskHandle>) -> Result<bool, StoreError> {
    match handle {
        Some(handle) => handle.cancellation_requested().await,
        None => Ok(false),
    }
}

async fn report(handle: Option<&TaskHandle>, progress: f32, phase: &str) -> Result<(), StoreError> {
    match handle {
        Some(handle) => handle.progress(progress, phase).await,
        None => Ok(()),
    }
}

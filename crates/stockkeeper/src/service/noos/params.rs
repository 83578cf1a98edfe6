use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    DaysAvailablePolicy,
    api::ErrorModel,
    service::{RetailStore, store::StoreError},
};

pub const DEFAULT_PARAMETER_SET: &str = "default";

/// A named, versioned set of algorithm thresholds. At most one set is
/// active at a time; the active set is what parameterless runs use.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlgorithmParameters {
    pub parameter_set: String,
    /// Sales with a discount share above this are dropped before analysis.
    pub liquidation_threshold: f64,
    pub bestseller_multiplier: f64,
    pub min_volume_threshold: f64,
    pub consistency_threshold: f64,
    pub analysis_start_date: Option<NaiveDate>,
    pub analysis_end_date: Option<NaiveDate>,
    pub core_duration_months: i32,
    pub bestseller_duration_days: i32,
    /// Denominator policy for per-day metrics; `None` defers to the service
    /// configuration.
    pub days_available_policy: Option<DaysAvailablePolicy>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for AlgorithmParameters {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            parameter_set: DEFAULT_PARAMETER_SET.to_string(),
            liquidation_threshold: 0.20,
            bestseller_multiplier: 1.2,
            min_volume_threshold: 10.0,
            consistency_threshold: 0.5,
            analysis_start_date: None,
            analysis_end_date: None,
            core_duration_months: 6,
            bestseller_duration_days: 90,
            days_available_policy: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl AlgorithmParameters {
    pub fn validate(&self) -> Result<(), ErrorModel> {
        if self.parameter_set.trim().is_empty() {
            return Err(invalid("parameterSet must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.liquidation_threshold) {
            return Err(invalid("liquidationThreshold must be between 0 and 1"));
        }
        if self.bestseller_multiplier <= 0.0 {
            return Err(invalid("bestsellerMultiplier must be greater than 0"));
        }
        if self.min_volume_threshold < 0.0 || self.min_volume_threshold.is_nan() {
            return Err(invalid("minVolumeThreshold must be 0 or greater"));
        }
        if !(0.0..=1.0).contains(&self.consistency_threshold) {
            return Err(invalid("consistencyThreshold must be between 0 and 1"));
        }
        if let (Some(start), Some(end)) = (self.analysis_start_date, self.analysis_end_date)
            && start > end
        {
            return Err(invalid("analysisStartDate must not be after analysisEndDate"));
        }
        Ok(())
    }

    /// Flat `key=value` rendering persisted on the task record for audit.
    #[must_use]
    pub fn encode_for_task(&self) -> String {
        let mut parts = vec![
            format!("parameterSet={}", self.parameter_set),
            format!("liquidationThreshold={}", self.liquidation_threshold),
            format!("bestsellerMultiplier={}", self.bestseller_multiplier),
            format!("minVolumeThreshold={}", self.min_volume_threshold),
            format!("consistencyThreshold={}", self.consistency_threshold),
        ];
        if let Some(start) = self.analysis_start_date {
            parts.push(format!("startDate={start}"));
        }
        if let Some(end) = self.analysis_end_date {
            parts.push(format!("endDate={end}"));
        }
        parts.join(", ")
    }
}

fn invalid(message: &str) -> ErrorModel {
    ErrorModel::bad_request(message, "InvalidAlgorithmParameters", None)
}

/// Explicit startup seeding of the `default` parameter set; reads never
/// create it. The seeded set becomes active only when no other set is.
#[tracing::instrument(skip(store))]
pub async fn seed_default_parameters(
    store: &dyn RetailStore,
) -> Result<AlgorithmParameters, StoreError> {
    if let Some(existing) = store.get_parameters(DEFAULT_PARAMETER_SET).await? {
        return Ok(existing);
    }
    let params = AlgorithmParameters {
        is_active: store.active_parameters().await?.is_none(),
        ..AlgorithmParameters::default()
    };
    tracing::info!("Seeding `default` algorithm parameter set");
    store.upsert_parameters(params).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_set_is_valid() {
        AlgorithmParameters::default().validate().unwrap();
    }

    #[test]
    fn test_threshold_ranges() {
        let mut params = AlgorithmParameters::default();
        params.liquidation_threshold = 1.1;
        assert!(params.validate().is_err());

        let mut params = AlgorithmParameters::default();
        params.bestseller_multiplier = 0.0;
        assert!(params.validate().is_err());

        let mut params = AlgorithmParameters::default();
        params.min_volume_threshold = f64::INFINITY;
        params.validate().unwrap();

        let mut params = AlgorithmParameters::default();
        params.analysis_start_date = Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        params.analysis_end_date = Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_encode_for_task() {
        let mut params = AlgorithmParameters::default();
        params.analysis_start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let encoded = params.encode_for_task();
        assert!(encoded.contains("liquidationThreshold=0.2"));
        assert!(encoded.contains("startDate=2024-01-01"));
        assert!(!encoded.contains("endDate"));
    }
}

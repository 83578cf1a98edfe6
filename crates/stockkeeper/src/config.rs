use std::{net::IpAddr, path::PathBuf, sync::LazyLock, time::Duration};

use serde::{Deserialize, Serialize};

pub static CONFIG: LazyLock<DynAppConfig> = LazyLock::new(get_config);

/// Service configuration, extracted from `STOCKKEEPER__`-prefixed
/// environment variables on first access.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DynAppConfig {
    pub bind_ip: IpAddr,
    pub listen_port: u16,
    /// Maximum wall-clock time for a single HTTP request. Task execution is
    /// not bounded by this; clients poll tasks instead.
    pub max_request_time_secs: u64,
    pub max_request_body_size: usize,
    /// Directory for task result files and upload error artifacts. An
    /// external janitor is expected to prune it.
    pub artifact_dir: PathBuf,
    /// Hard cap on data rows per uploaded file.
    pub upload_row_limit: usize,
    pub file_workers: PoolSizing,
    pub noos_workers: PoolSizing,
    pub noos: NoosConfig,
    pub pg: PgConfig,
}

impl DynAppConfig {
    #[must_use]
    pub fn max_request_time(&self) -> Duration {
        Duration::from_secs(self.max_request_time_secs)
    }
}

impl Default for DynAppConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::from([0, 0, 0, 0]),
            listen_port: 8181,
            max_request_time_secs: 120,
            max_request_body_size: 1024 * 1024 * 128,
            artifact_dir: std::env::temp_dir().join("stockkeeper"),
            upload_row_limit: 500_000,
            file_workers: PoolSizing {
                parallelism: 2,
                queue_capacity: 16,
            },
            // A single noos worker serialises algorithm runs, which avoids
            // racing whole-table replacements of the results.
            noos_workers: PoolSizing {
                parallelism: 1,
                queue_capacity: 4,
            },
            noos: NoosConfig::default(),
            pg: PgConfig::default(),
        }
    }
}

/// Sizing of one worker pool: `parallelism` concurrent executions plus a
/// bounded wait queue of `queue_capacity` submissions.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PoolSizing {
    pub parallelism: usize,
    pub queue_capacity: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoosConfig {
    /// Fallback policy when a parameter set does not pick one itself.
    pub days_available_policy: DaysAvailablePolicy,
    /// Rows per insert batch when persisting a run's results.
    pub persist_batch_size: usize,
}

impl Default for NoosConfig {
    fn default() -> Self {
        Self {
            days_available_policy: DaysAvailablePolicy::ObservedDays,
            persist_batch_size: 50,
        }
    }
}

/// Denominator used for per-style rate-of-sale and consistency metrics.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DaysAvailablePolicy {
    /// `max(distinct sale days, 1)` per style. Consistency is then 1.0 for
    /// every style that sold at all; kept as the default because historical
    /// results were produced this way.
    #[default]
    ObservedDays,
    /// Day count of the analysis window, falling back to the span of the
    /// loaded sales when the window is open-ended.
    AnalysisWindow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PgConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

fn get_config() -> DynAppConfig {
    let defaults = figment::providers::Serialized::defaults(DynAppConfig::default());

    #[cfg(not(test))]
    let prefixes = &["STOCKKEEPER__"];
    #[cfg(test)]
    let prefixes = &["STOCKKEEPER_TEST__"];

    let mut config = figment::Figment::from(defaults);
    for prefix in prefixes {
        let env = figment::providers::Env::prefixed(prefix).split("__");
        config = config.merge(env);
    }

    match config.extract::<DynAppConfig>() {
        Ok(c) => c,
        Err(e) => {
            panic!("Failed to extract Stockkeeper config: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_extract() {
        figment::Jail::expect_with(|_jail| {
            let config = get_config();
            assert_eq!(config.listen_port, 8181);
            assert_eq!(config.upload_row_limit, 500_000);
            assert_eq!(
                config.noos.days_available_policy,
                DaysAvailablePolicy::ObservedDays
            );
            Ok(())
        });
    }

    #[test]
    fn test_pool_sizing_env_vars() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("STOCKKEEPER_TEST__FILE_WORKERS__PARALLELISM", "7");
            jail.set_env("STOCKKEEPER_TEST__NOOS_WORKERS__QUEUE_CAPACITY", "0");
            let config = get_config();
            assert_eq!(config.file_workers.parallelism, 7);
            assert_eq!(config.noos_workers.queue_capacity, 0);
            Ok(())
        });
    }

    #[test]
    fn test_days_available_policy_env_var() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("STOCKKEEPER_TEST__NOOS__DAYS_AVAILABLE_POLICY", "analysis-window");
            let config = get_config();
            assert_eq!(
                config.noos.days_available_policy,
                DaysAvailablePolicy::AnalysisWindow
            );
            Ok(())
        });
    }
}

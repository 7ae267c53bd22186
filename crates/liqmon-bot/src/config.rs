//! Application configuration, loaded from a TOML file with compiled-in
//! defaults for every field.

use crate::error::{AppError, AppResult};
use liqmon_core::{NotionalThresholds, TierThresholds};
use liqmon_detector::DetectorConfig;
use liqmon_fetcher::FetcherConfig;
use liqmon_scheduler::{DailySummaryConfig, DiscoveryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Upstream info-endpoint base URL.
    pub info_url: String,
    /// Upstream cohort GraphQL endpoint URL.
    pub graphql_url: String,
    /// Outbound webhook URL for alert delivery. `None` logs alerts instead
    /// of sending them (also the `--dry-run` behavior regardless of this).
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Path to a JSONL liquidation-history file tailed for wallet discovery.
    /// `None` disables that discovery source entirely.
    #[serde(default)]
    pub liquidation_history_path: Option<String>,

    pub fetcher: FetcherConfig,
    pub tier_thresholds: TierThresholds,
    pub notional_thresholds: NotionalThresholds,
    pub detector: DetectorConfig,
    pub discovery: DiscoveryConfig,
    pub daily_summary: DailySummaryConfig,

    /// Interval between coalesced position_cache persistence flushes, ms.
    pub persistence_flush_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            info_url: "https://api.hyperliquid.xyz/info".to_string(),
            graphql_url: "https://api.hyperliquid.xyz/graphql".to_string(),
            webhook_url: None,
            db_path: "liqmon.sqlite3".to_string(),
            liquidation_history_path: None,
            fetcher: FetcherConfig::default(),
            tier_thresholds: TierThresholds::default(),
            notional_thresholds: NotionalThresholds::default(),
            detector: DetectorConfig::default(),
            discovery: DiscoveryConfig::default(),
            daily_summary: DailySummaryConfig::default(),
            persistence_flush_interval_ms: 1_000,
        }
    }
}

impl AppConfig {
    /// Load from `LIQMON_CONFIG` env var, else `config/default.toml` if it
    /// exists, else compiled-in defaults.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("LIQMON_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }
}

//! Discovery loop: walks cohort pages and liquidation
//! history to grow the wallet registry, then scans due wallets across every
//! exchange and admits surviving positions into the cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use liqmon_cache::{ApplyOutcome, PositionCache};
use liqmon_core::{DiscoverySource, Exchange, NotionalThresholds, Tier, WalletAddress};
use liqmon_fetcher::ExchangeApi;
use liqmon_persistence::PersistenceStore;
use liqmon_registry::WalletRegistry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A liquidation-history entry surfaced by the external import tool.
#[derive(Debug, Clone)]
pub struct LiquidationHistoryEntry {
    pub address: WalletAddress,
    pub historical_notional: Decimal,
}

#[async_trait]
pub trait LiquidationHistorySource: Send + Sync {
    async fn poll_new_entries(&self) -> Vec<LiquidationHistoryEntry>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub cohort_ids: Vec<String>,
    pub cohort_page_size: u32,
    pub cohort_page_pause: StdDuration,
    pub min_cohort_aggregate_value: Decimal,
    pub pure_long_leverage_ceiling: Decimal,
    pub min_liquidation_history_notional: Decimal,
    pub min_interval_minutes: i64,
    pub max_interval_minutes: i64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            cohort_ids: vec![
                "kraken".into(),
                "large_whale".into(),
                "whale".into(),
                "rekt".into(),
                "shark".into(),
                "extremely_profitable".into(),
                "very_unprofitable".into(),
                "very_profitable".into(),
                "profitable".into(),
                "unprofitable".into(),
            ],
            cohort_page_size: 500,
            cohort_page_pause: StdDuration::from_secs(1),
            min_cohort_aggregate_value: dec!(300_000),
            pure_long_leverage_ceiling: dec!(1.0),
            min_liquidation_history_notional: dec!(100_000),
            min_interval_minutes: 30,
            max_interval_minutes: 240,
        }
    }
}

impl DiscoveryConfig {
    /// `interval = clamp(30 * (1 + critical_count/10), 30, 240) minutes`.
    /// Any monotonic function of the critical count within that range would
    /// satisfy the underlying contract; this is the concrete choice.
    pub fn adaptive_interval(&self, critical_count: usize) -> chrono::Duration {
        let base = Decimal::from(self.min_interval_minutes);
        let factor = Decimal::ONE + Decimal::from(critical_count) / Decimal::from(10);
        let minutes = (base * factor)
            .clamp(Decimal::from(self.min_interval_minutes), Decimal::from(self.max_interval_minutes));
        let minutes: i64 = minutes.round().try_into().unwrap_or(self.min_interval_minutes);
        chrono::Duration::minutes(minutes)
    }
}

pub struct DiscoveryLoop {
    registry: Arc<WalletRegistry>,
    cache: Arc<PositionCache>,
    fetcher: Arc<dyn ExchangeApi>,
    history: Arc<dyn LiquidationHistorySource>,
    persistence: Arc<PersistenceStore>,
    notional: NotionalThresholds,
    config: DiscoveryConfig,
}

impl DiscoveryLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<WalletRegistry>,
        cache: Arc<PositionCache>,
        fetcher: Arc<dyn ExchangeApi>,
        history: Arc<dyn LiquidationHistorySource>,
        persistence: Arc<PersistenceStore>,
        notional: NotionalThresholds,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            fetcher,
            history,
            persistence,
            notional,
            config,
        }
    }

    /// Write the current state of `address` through to persistence. Called
    /// after any registry mutation so a restart never loses a discovered
    /// wallet that hasn't been scanned yet.
    async fn persist_wallet(&self, address: &WalletAddress) {
        if let Some(wallet) = self.registry.get(address) {
            if let Err(e) = self.persistence.save_wallet(&wallet).await {
                warn!(%address, error = %e, "failed to persist wallet");
            }
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let critical_count = self
                .cache
                .snapshot()
                .into_iter()
                .filter(|e| e.tier == Tier::Critical)
                .count();
            let interval = self.config.adaptive_interval(critical_count).to_std().unwrap_or(StdDuration::from_secs(1800));
            info!(minutes = interval.as_secs() / 60, critical_count, "discovery sleeping until next cycle");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => { continue; }
            }
            if *shutdown.borrow() {
                return;
            }
            self.run_cycle().await;
        }
    }

    pub async fn run_cycle(&self) {
        let now = Utc::now();
        self.scan_cohorts(now).await;
        self.ingest_liquidation_history(now).await;
        self.scan_due_wallets(now).await;
    }

    async fn scan_cohorts(&self, now: DateTime<Utc>) {
        for cohort_id in &self.config.cohort_ids {
            let mut offset = 0u32;
            loop {
                let page = match self.fetcher.get_cohort_page(cohort_id, offset, self.config.cohort_page_size).await {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(cohort_id, error = %e, "cohort page fetch failed, skipping rest of cohort");
                        break;
                    }
                };
                for trader in &page.traders {
                    self.admit_cohort_trader(cohort_id, trader, now).await;
                }
                if !page.has_more {
                    break;
                }
                offset += self.config.cohort_page_size;
                tokio::time::sleep(self.config.cohort_page_pause).await;
            }
        }
    }

    async fn admit_cohort_trader(&self, cohort_id: &str, trader: &liqmon_fetcher::CohortTrader, now: DateTime<Utc>) {
        let Ok(address) = WalletAddress::parse(&trader.address) else {
            warn!(address = %trader.address, "cohort returned unparseable address");
            return;
        };
        let Ok(account_value) = Decimal::from_str(&trader.account_value) else {
            return;
        };
        if account_value < self.config.min_cohort_aggregate_value {
            return;
        }
        let leverage = trader.leverage.map(Decimal::try_from).transpose().ok().flatten();
        let purely_long_no_risk = trader.is_long == Some(true)
            && leverage.map(|l| l <= self.config.pure_long_leverage_ceiling).unwrap_or(false);
        if purely_long_no_risk {
            return;
        }
        self.registry.upsert(address, DiscoverySource::Cohort, Some(cohort_id.to_string()), Some(account_value), now);
        self.persist_wallet(&address).await;
    }

    async fn ingest_liquidation_history(&self, now: DateTime<Utc>) {
        for entry in self.history.poll_new_entries().await {
            if entry.historical_notional < self.config.min_liquidation_history_notional {
                continue;
            }
            let address = entry.address;
            self.registry.upsert(
                address,
                DiscoverySource::LiquidationHistory,
                Some("liq_history".to_string()),
                Some(entry.historical_notional),
                now,
            );
            self.persist_wallet(&address).await;
        }
    }

    async fn scan_due_wallets(&self, now: DateTime<Utc>) {
        let due = self.registry.iter_due(now);
        debug!(count = due.len(), "discovery scanning due wallets");
        for address in due {
            let mut positions_found = 0usize;
            let mut peak_aggregate = Decimal::ZERO;
            for exchange in Exchange::ALL {
                let positions = match crate::common::fetch_positions_with_marks(self.fetcher.as_ref(), &address, exchange).await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(%address, %exchange, error = %e, "discovery scan failed for wallet/exchange");
                        continue;
                    }
                };
                for position in positions {
                    peak_aggregate += position.notional.abs();
                    if position.liquidation_price.is_none() {
                        continue;
                    }
                    let unprefixed = exchange.strip_prefix(&position.key.token);
                    if !self.notional.meets_threshold(unprefixed, position.margin_type, position.notional) {
                        continue;
                    }
                    positions_found += 1;
                    let key = position.key.clone();
                    let outcome = self.cache.apply_observation(position, now);
                    if let ApplyOutcome::Inserted = outcome {
                        if let Some(entry) = self.cache.get(&key) {
                            self.persistence.queue_position(key, entry).await;
                        }
                    }
                }
            }
            self.registry.mark_scanned(&address, peak_aggregate, positions_found, now);
            self.persist_wallet(&address).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_interval_is_monotonic_in_critical_count() {
        let config = DiscoveryConfig::default();
        let low = config.adaptive_interval(0);
        let high = config.adaptive_interval(50);
        assert!(low <= high);
        assert!(low >= chrono::Duration::minutes(30));
        assert!(high <= chrono::Duration::minutes(240));
    }

    #[test]
    fn adaptive_interval_matches_default_formula() {
        let config = DiscoveryConfig::default();
        // 30 * (1 + 10/10) = 60
        assert_eq!(config.adaptive_interval(10), chrono::Duration::minutes(60));
    }
}

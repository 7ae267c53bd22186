//! Application orchestration: wires the three scheduling loops to a shared
//! cache, registry, fetcher, and persistence store, and drives graceful
//! shutdown.
//!
//! `tokio::spawn` one task per loop, `tokio::signal::ctrl_c()` selected
//! against the loops' own work, and a hard deadline past which the drain
//! is abandoned rather than blocking shutdown indefinitely.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::sinks::{HttpWebhookSink, JsonlHistoryImporter, LoggingSink, NoLiquidationHistory};
use liqmon_cache::PositionCache;
use liqmon_detector::{Alerter, StateChangeDetector};
use liqmon_fetcher::{ExchangeApi, RateLimitedFetcher};
use liqmon_persistence::PersistenceStore;
use liqmon_registry::WalletRegistry;
use liqmon_scheduler::{DailySummaryScheduler, DiscoveryLoop, RefreshScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

pub struct Application {
    config: AppConfig,
    dry_run: bool,
}

impl Application {
    pub fn new(config: AppConfig, dry_run: bool) -> Self {
        Self { config, dry_run }
    }

    pub async fn run(self) -> AppResult<()> {
        let persistence = Arc::new(PersistenceStore::open(&self.config.db_path)?);
        let cache = Arc::new(PositionCache::new(self.config.tier_thresholds));
        let registry = Arc::new(WalletRegistry::new());

        for wallet in persistence.restore_wallets().await? {
            registry.restore(wallet);
        }
        let mut restored = 0usize;
        for entry in persistence.restore_positions().await? {
            cache.restore(entry);
            restored += 1;
        }
        info!(wallets = registry.size(), positions = restored, "restored state from persistence");

        let fetcher: Arc<dyn ExchangeApi> = Arc::new(RateLimitedFetcher::new(
            self.config.info_url.clone(),
            self.config.graphql_url.clone(),
            self.config.fetcher,
        ));
        let detector = Arc::new(StateChangeDetector::new(self.config.detector, self.config.tier_thresholds));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles = Vec::new();

        if self.dry_run {
            let alerter = Arc::new(Alerter::new(persistence.clone(), Arc::new(LoggingSink)));
            handles.push(self.spawn_loops(cache.clone(), registry.clone(), fetcher.clone(), detector.clone(), alerter, persistence.clone(), shutdown_rx.clone()));
        } else if let Some(url) = self.config.webhook_url.clone() {
            let alerter = Arc::new(Alerter::new(persistence.clone(), Arc::new(HttpWebhookSink::new(url))));
            handles.push(self.spawn_loops(cache.clone(), registry.clone(), fetcher.clone(), detector.clone(), alerter, persistence.clone(), shutdown_rx.clone()));
        } else {
            warn!("no webhook_url configured, alerts will only be logged");
            let alerter = Arc::new(Alerter::new(persistence.clone(), Arc::new(LoggingSink)));
            handles.push(self.spawn_loops(cache.clone(), registry.clone(), fetcher.clone(), detector.clone(), alerter, persistence.clone(), shutdown_rx.clone()));
        }

        let flush_interval = Duration::from_millis(self.config.persistence_flush_interval_ms);
        let flush_handle = {
            let persistence = persistence.clone();
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(flush_interval) => {
                            if let Err(e) = persistence.flush_positions().await {
                                warn!(error = %e, "position_cache flush failed");
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                let _ = persistence.flush_positions().await;
                                return;
                            }
                        }
                    }
                }
            })
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
            }
        }
        let _ = shutdown_tx.send(true);

        let all_handles = handles.into_iter().flatten().chain(std::iter::once(flush_handle));
        let drain = futures_util::future::join_all(all_handles);
        if tokio::time::timeout(SHUTDOWN_DEADLINE, drain).await.is_err() {
            warn!("shutdown deadline exceeded, persisted state may only reflect the last flush");
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_loops<D, S>(
        &self,
        cache: Arc<PositionCache>,
        registry: Arc<WalletRegistry>,
        fetcher: Arc<dyn ExchangeApi>,
        detector: Arc<StateChangeDetector>,
        alerter: Arc<Alerter<D, S>>,
        persistence: Arc<PersistenceStore>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>>
    where
        D: liqmon_detector::AlertDedupStore + 'static,
        S: liqmon_detector::MessageSink + 'static,
    {
        let refresh = Arc::new(RefreshScheduler::new(cache.clone(), fetcher.clone(), detector, alerter.clone(), persistence.clone()));
        let refresh_handle = {
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move { refresh.run(shutdown_rx).await })
        };

        let history: Arc<dyn liqmon_scheduler::LiquidationHistorySource> = match &self.config.liquidation_history_path {
            Some(path) => Arc::new(JsonlHistoryImporter::new(path.clone())),
            None => Arc::new(NoLiquidationHistory),
        };
        let discovery = Arc::new(DiscoveryLoop::new(
            registry,
            cache.clone(),
            fetcher,
            history,
            persistence,
            self.config.notional_thresholds.clone(),
            self.config.discovery.clone(),
        ));
        let discovery_handle = {
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move { discovery.run(shutdown_rx).await })
        };

        let summary = Arc::new(DailySummaryScheduler::new(cache, alerter.sink_handle(), self.config.daily_summary.clone()));
        let summary_handle = tokio::spawn(async move { summary.run(shutdown_rx).await });

        vec![refresh_handle, discovery_handle, summary_handle]
    }
}

/// End-to-end scenarios driving the cache, detector, alerter, registry,
/// discovery, and persistence together the way the three scheduler loops
/// would, without spinning up the loops themselves.
#[cfg(test)]
mod scenario_tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use liqmon_cache::{ApplyOutcome, PositionCache};
    use liqmon_core::{
        AlertKind, AlertSummary, Exchange, MarginType, NotionalThresholds, Position, PositionKey,
        Price, Side, Size, TierThresholds, WalletAddress,
    };
    use liqmon_detector::{AlertDedupStore, Alerter, DetectorConfig, MessageSink, StateChangeDetector};
    use liqmon_fetcher::{CohortPage, ExchangeApi};
    use liqmon_persistence::PersistenceStore;
    use liqmon_registry::WalletRegistry;
    use liqmon_scheduler::{DiscoveryConfig, DiscoveryLoop, LiquidationHistoryEntry, LiquidationHistorySource};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn addr() -> WalletAddress {
        WalletAddress::parse("0x000000000000000000000000000000000000aa").unwrap()
    }

    fn long_position(token: &str, exchange: Exchange, mark: Decimal, liq: Decimal, size: Decimal, notional: Decimal) -> Position {
        long_position_margined(token, exchange, mark, liq, size, notional, MarginType::Cross)
    }

    fn long_position_margined(
        token: &str,
        exchange: Exchange,
        mark: Decimal,
        liq: Decimal,
        size: Decimal,
        notional: Decimal,
        margin_type: MarginType,
    ) -> Position {
        Position {
            key: PositionKey::new(addr(), token, exchange, Side::Long),
            size: Size::new(size),
            entry_price: Price::new(mark),
            mark_price: Price::new(mark),
            liquidation_price: Some(Price::new(liq)),
            notional,
            leverage: dec!(10),
            margin_type,
            last_updated: Utc::now(),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, text: String) {
            self.sent.lock().push(text);
        }
    }

    #[derive(Default)]
    struct NullDedup;

    #[async_trait]
    impl AlertDedupStore for NullDedup {
        async fn already_emitted(&self, _key: &PositionKey, _kind: AlertKind, _day_bucket: &str) -> bool {
            false
        }
        async fn record(&self, _record: &liqmon_core::AlertRecord) {}
    }

    fn summarize(entry: &liqmon_core::CachedPosition) -> AlertSummary {
        AlertSummary {
            token: entry.position.key.token.clone(),
            side: entry.position.key.side.to_string(),
            exchange: entry.position.key.exchange.to_string(),
            notional: entry.position.notional,
            distance_pct: entry.distance_pct,
            liquidation_price: entry.position.liquidation_price.map(|p| p.inner()),
        }
    }

    /// Applies one observation to the cache and, for an update to a
    /// previously-cached entry, runs it through the detector and alerter —
    /// the same sequence `RefreshScheduler::react` follows.
    async fn observe<D, S>(
        cache: &PositionCache,
        detector: &StateChangeDetector,
        alerter: &Alerter<D, S>,
        position: Position,
        now: chrono::DateTime<Utc>,
    ) where
        D: AlertDedupStore,
        S: MessageSink,
    {
        let key = position.key.clone();
        let outcome = cache.apply_observation(position, now);
        if let ApplyOutcome::Updated { previous } = outcome {
            let current = cache.get(&key).unwrap();
            let kind = detector.classify(&previous, &current);
            alerter.emit(cache, &key, kind, summarize(&current), now).await;
        }
    }

    #[tokio::test]
    async fn approaching_then_imminent_then_full_liquidation() {
        let cache = PositionCache::new(TierThresholds::default());
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        let sink = Arc::new(RecordingSink::default());
        let alerter = Alerter::new(NullDedup, sink.clone());
        let liq = dec!(99000);
        let key = PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long);
        let now = Utc::now();

        // Seed: distance 1.0%, well outside any alerting band.
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(100000), liq, dec!(1), dec!(100000)), now).await;
        assert!(sink.sent.lock().is_empty());

        // Distance ~0.30%: still above the approaching threshold, silent.
        let t1 = now + chrono::Duration::seconds(1);
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(99300), liq, dec!(1), dec!(99300)), t1).await;
        assert!(sink.sent.lock().is_empty());

        // Distance ~0.20%: crosses into the approaching band.
        let t2 = t1 + chrono::Duration::seconds(1);
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(99200), liq, dec!(1), dec!(99200)), t2).await;
        assert_eq!(sink.sent.lock().len(), 1);
        assert!(sink.sent.lock()[0].contains("approaching"));

        // Distance ~0.11%: crosses into the imminent band.
        let t3 = t2 + chrono::Duration::seconds(1);
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(99110), liq, dec!(1), dec!(99110)), t3).await;
        assert_eq!(sink.sent.lock().len(), 2);
        assert!(sink.sent.lock()[1].contains("IMMINENT"));

        // Next wallet fetch no longer returns the position at all.
        let t4 = t3 + chrono::Duration::seconds(1);
        if let Some(previous) = cache.remove(&key) {
            let kind = detector.classify_absence();
            alerter.emit(&cache, &key, kind, summarize(&previous), t4).await;
        }
        assert_eq!(sink.sent.lock().len(), 3);
        assert!(sink.sent.lock()[2].contains("FULL LIQUIDATION"));
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn collateral_added_then_no_alert_spam() {
        let cache = PositionCache::new(TierThresholds::default());
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        let sink = Arc::new(RecordingSink::default());
        let alerter = Alerter::new(NullDedup, sink.clone());
        let now = Utc::now();

        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(3500), dec!(3480), dec!(1), dec!(3500)), now).await;
        assert!(sink.sent.lock().is_empty());

        // Margin added: liquidation price drops, same size — collateral-added.
        let t1 = now + chrono::Duration::seconds(1);
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(3500), dec!(3400), dec!(1), dec!(3500)), t1).await;
        assert_eq!(sink.sent.lock().len(), 1);
        assert!(sink.sent.lock()[0].contains("collateral"));

        // Mark drifts with liq/size unchanged: no further alert.
        let t2 = t1 + chrono::Duration::seconds(1);
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(3414), dec!(3400), dec!(1), dec!(3414)), t2).await;
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn natural_recovery_then_rearmed_approaching() {
        let cache = PositionCache::new(TierThresholds::default());
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        let sink = Arc::new(RecordingSink::default());
        let alerter = Alerter::new(NullDedup, sink.clone());
        let liq = dec!(99000);
        let now = Utc::now();

        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(100000), liq, dec!(1), dec!(100000)), now).await;

        // Distance ~0.23%: approaching fires.
        let t1 = now + chrono::Duration::seconds(1);
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(99226), liq, dec!(1), dec!(99226)), t1).await;
        assert_eq!(sink.sent.lock().len(), 1);

        // Distance ~0.80%: well above the rearm margin, silent.
        let t2 = t1 + chrono::Duration::seconds(1);
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(99800), liq, dec!(1), dec!(99800)), t2).await;
        assert_eq!(sink.sent.lock().len(), 1);

        // Distance back down to ~0.24%, after having rearmed above 0.30%: fresh alert.
        let t3 = t2 + chrono::Duration::seconds(1);
        observe(&cache, &detector, &alerter, long_position("BTC", Exchange::Main, dec!(99240), liq, dec!(1), dec!(99240)), t3).await;
        assert_eq!(sink.sent.lock().len(), 2);
    }

    struct FakeFetcher {
        by_exchange: HashMap<Exchange, Vec<Position>>,
    }

    #[async_trait]
    impl ExchangeApi for FakeFetcher {
        async fn get_positions(&self, _address: &WalletAddress, exchange: Exchange) -> liqmon_fetcher::Result<Vec<Position>> {
            Ok(self.by_exchange.get(&exchange).cloned().unwrap_or_default())
        }
        async fn get_mark_prices(&self, _exchange: Exchange) -> liqmon_fetcher::Result<HashMap<String, Decimal>> {
            Ok(HashMap::new())
        }
        async fn get_cohort_page(&self, _cohort_id: &str, _offset: u32, _limit: u32) -> liqmon_fetcher::Result<CohortPage> {
            Ok(CohortPage { traders: vec![], has_more: false })
        }
    }

    struct NoHistory;
    #[async_trait]
    impl LiquidationHistorySource for NoHistory {
        async fn poll_new_entries(&self) -> Vec<LiquidationHistoryEntry> {
            vec![]
        }
    }

    #[tokio::test]
    async fn below_threshold_position_never_enters_cache() {
        let registry = Arc::new(WalletRegistry::new());
        let now = Utc::now();
        registry.upsert(addr(), liqmon_core::DiscoverySource::Manual, None, None, now);

        let cache = Arc::new(PositionCache::new(TierThresholds::default()));
        let mut by_exchange = HashMap::new();
        by_exchange.insert(
            Exchange::Xyz,
            vec![long_position_margined(
                "xyz:SILVER",
                Exchange::Xyz,
                dec!(30),
                dec!(28),
                dec!(200),
                dec!(50_000),
                MarginType::Isolated,
            )],
        );
        let fetcher: Arc<dyn ExchangeApi> = Arc::new(FakeFetcher { by_exchange });

        let mut overrides = HashMap::new();
        overrides.insert("SILVER".to_string(), dec!(1_000_000));
        let notional = NotionalThresholds::with_overrides(overrides, liqmon_core::notional::DEFAULT_CROSS_THRESHOLD);

        let dir = TempDir::new().unwrap();
        let persistence = Arc::new(PersistenceStore::open(dir.path().join("liqmon.sqlite3").to_str().unwrap()).unwrap());
        let discovery = DiscoveryLoop::new(registry, cache.clone(), fetcher, Arc::new(NoHistory), persistence, notional, DiscoveryConfig::default());
        discovery.run_cycle().await;

        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn restart_preserves_dedup_but_not_across_alert_kinds() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("liqmon.sqlite3");
        let db_path = db_path.to_str().unwrap();
        let key = PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long);

        {
            let store = PersistenceStore::open(db_path).unwrap();
            let record = liqmon_core::AlertRecord {
                position_key: key.clone(),
                kind: AlertKind::Approaching,
                emitted_at: Utc::now(),
                day_bucket: "2026-08-01".to_string(),
                summary: AlertSummary {
                    token: "BTC".into(),
                    side: "long".into(),
                    exchange: "main".into(),
                    notional: dec!(99200),
                    distance_pct: dec!(0.20),
                    liquidation_price: Some(dec!(99000)),
                },
            };
            store.record(&record).await;
        }

        // Simulate a process restart: reopen the same database file.
        let restarted = PersistenceStore::open(db_path).unwrap();
        assert!(restarted.already_emitted(&key, AlertKind::Approaching, "2026-08-01").await);
        assert!(!restarted.already_emitted(&key, AlertKind::Imminent, "2026-08-01").await);
    }
}

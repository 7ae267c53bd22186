//! Tiered refresh scheduler: a single-writer loop that picks
//! the most overdue cached position, refreshes its whole wallet/exchange
//! pair in one upstream call (fairness coalescing), and hands every result
//! to the detector.

use crate::common::fetch_positions_with_marks;
use chrono::Utc;
use liqmon_cache::{ApplyOutcome, PositionCache};
use liqmon_core::{AlertSummary, CachedPosition, Exchange, PositionKey, WalletAddress};
use liqmon_detector::{AlertDedupStore, Alerter, MessageSink, StateChangeDetector};
use liqmon_fetcher::ExchangeApi;
use liqmon_persistence::PersistenceStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tracing::{debug, warn};

pub struct RefreshScheduler<D, S> {
    cache: Arc<PositionCache>,
    fetcher: Arc<dyn ExchangeApi>,
    detector: Arc<StateChangeDetector>,
    alerter: Arc<Alerter<D, S>>,
    persistence: Arc<PersistenceStore>,
    /// Upper bound on how long the loop sleeps with nothing due, so a
    /// shutdown signal is never missed for more than this long.
    idle_poll: StdDuration,
}

impl<D, S> RefreshScheduler<D, S>
where
    D: AlertDedupStore + 'static,
    S: MessageSink + 'static,
{
    pub fn new(
        cache: Arc<PositionCache>,
        fetcher: Arc<dyn ExchangeApi>,
        detector: Arc<StateChangeDetector>,
        alerter: Arc<Alerter<D, S>>,
        persistence: Arc<PersistenceStore>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            detector,
            alerter,
            persistence,
            idle_poll: StdDuration::from_millis(250),
        }
    }

    /// Runs until `shutdown` is signalled. The fetcher's own admission gate
    /// is the only concurrency bound; this loop is otherwise unthrottled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let now = Utc::now();
            let Some(key) = self.cache.pop_due(now) else {
                let sleep = self
                    .cache
                    .earliest_deadline()
                    .map(|deadline| (deadline - now).to_std().unwrap_or(self.idle_poll))
                    .unwrap_or(self.idle_poll)
                    .min(self.idle_poll.max(StdDuration::from_secs(1)));
                tokio::select! {
                    _ = tokio::time::sleep(sleep) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            };

            self.refresh_wallet_exchange(&key.address, key.exchange, now).await;
        }
    }

    async fn refresh_wallet_exchange(&self, address: &WalletAddress, exchange: Exchange, now: chrono::DateTime<Utc>) {
        let existing = self.cache.keys_for_wallet_exchange(address, exchange);

        let positions = match fetch_positions_with_marks(self.fetcher.as_ref(), address, exchange).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(%address, %exchange, error = %e, "refresh failed, rescheduling");
                for key in &existing {
                    if let Some(entry) = self.cache.get(key) {
                        let retry_at = now + chrono::Duration::milliseconds(self.cache.thresholds().period_ms(entry.tier) as i64);
                        self.cache.reschedule(key, retry_at);
                    }
                }
                return;
            }
        };

        let mut seen: HashSet<PositionKey> = HashSet::new();
        for position in positions {
            let key = position.key.clone();
            if !self.cache.contains(&key) {
                // New positions are the discovery loop's job to admit.
                continue;
            }
            seen.insert(key.clone());
            let outcome = self.cache.apply_observation(position, now);
            self.persist_outcome(&key, &outcome).await;
            self.react(&key, outcome, now).await;
        }

        for key in existing {
            if seen.contains(&key) {
                continue;
            }
            if let Some(previous) = self.cache.remove(&key) {
                debug!(%key, "wallet fetch no longer returns position, treating as full liquidation");
                if let Err(e) = self.persistence.remove_position(&key).await {
                    warn!(%key, error = %e, "failed to remove liquidated position from persistence");
                }
                let kind = self.detector.classify_absence();
                self.alerter.emit(&self.cache, &key, kind, summarize(&previous), now).await;
            }
        }
    }

    /// Mirrors a cache mutation into persistence: a live entry is queued for
    /// the next coalesced flush, an eviction is removed immediately.
    async fn persist_outcome(&self, key: &PositionKey, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Inserted | ApplyOutcome::Updated { .. } => {
                if let Some(entry) = self.cache.get(key) {
                    self.persistence.queue_position(key.clone(), entry).await;
                }
            }
            ApplyOutcome::Evicted { .. } => {
                if let Err(e) = self.persistence.remove_position(key).await {
                    warn!(%key, error = %e, "failed to remove evicted position from persistence");
                }
            }
            ApplyOutcome::Stale => {}
        }
    }

    async fn react(&self, key: &PositionKey, outcome: ApplyOutcome, now: chrono::DateTime<Utc>) {
        let ApplyOutcome::Updated { previous } = outcome else {
            return;
        };
        let Some(current) = self.cache.get(key) else {
            return;
        };
        let kind = self.detector.classify(&previous, &current);
        self.alerter.emit(&self.cache, key, kind, summarize(&current), now).await;
    }
}

fn summarize(entry: &CachedPosition) -> AlertSummary {
    AlertSummary {
        token: entry.position.key.token.clone(),
        side: entry.position.key.side.to_string(),
        exchange: entry.position.key.exchange.to_string(),
        notional: entry.position.notional,
        distance_pct: entry.distance_pct,
        liquidation_price: entry.position.liquidation_price.map(|p| p.inner()),
    }
}

//! Alert emission: deduplicated, idempotent per `(position key, kind, day)`.
//! The detector decides *what* happened; this module decides whether it has
//! already been said and, if not, says it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use liqmon_cache::PositionCache;
use liqmon_core::{AlertKind, AlertRecord, AlertSummary, PositionKey};
use std::sync::Arc;
use tracing::{info, warn};

/// Durable dedup store. Implemented by the persistence layer's `alert_log`
/// table; injected here so the detector crate stays storage-agnostic.
#[async_trait]
pub trait AlertDedupStore: Send + Sync {
    async fn already_emitted(&self, key: &PositionKey, kind: AlertKind, day_bucket: &str) -> bool;
    async fn record(&self, record: &AlertRecord);
}

#[async_trait]
impl<T> AlertDedupStore for Arc<T>
where
    T: AlertDedupStore + ?Sized,
{
    async fn already_emitted(&self, key: &PositionKey, kind: AlertKind, day_bucket: &str) -> bool {
        T::already_emitted(self, key, kind, day_bucket).await
    }

    async fn record(&self, record: &AlertRecord) {
        T::record(self, record).await
    }
}

/// The outbound message capability: one method, one string.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, text: String);
}

pub struct Alerter<D, S> {
    dedup: D,
    sink: Arc<S>,
}

impl<D, S> Alerter<D, S>
where
    D: AlertDedupStore,
    S: MessageSink,
{
    pub fn new(dedup: D, sink: Arc<S>) -> Self {
        Self { dedup, sink }
    }

    /// Hands out the same sink handle the alerter sends through, so callers
    /// needing an independent outbound channel (e.g. the daily summary) can
    /// share it without a second connection.
    pub fn sink_handle(&self) -> Arc<S> {
        self.sink.clone()
    }

    /// Emit `kind` for `key` if it is emittable and not already recorded
    /// today. Sets the cache's alert flag on imminent/approaching so the
    /// hysteresis rule in [`liqmon_cache::PositionCache`] can re-arm it later.
    pub async fn emit(
        &self,
        cache: &PositionCache,
        key: &PositionKey,
        kind: AlertKind,
        summary: AlertSummary,
        now: DateTime<Utc>,
    ) {
        if !kind.is_emittable() {
            return;
        }
        let day_bucket = AlertRecord::day_bucket_for(now);
        if self.dedup.already_emitted(key, kind, &day_bucket).await {
            return;
        }

        let record = AlertRecord {
            position_key: key.clone(),
            kind,
            emitted_at: now,
            day_bucket,
            summary,
        };
        self.dedup.record(&record).await;

        match kind {
            AlertKind::Imminent => cache.mark_critical_alerted(key),
            AlertKind::Approaching => cache.mark_approaching_alerted(key),
            _ => {}
        }

        info!(%key, %kind, "emitting alert");
        self.sink.send(format_alert(&record)).await;
    }
}

fn format_alert(record: &AlertRecord) -> String {
    let s = &record.summary;
    match record.kind {
        AlertKind::FullLiquidation => format!(
            "FULL LIQUIDATION: {} {} {} on {} (last notional ${})",
            s.side, s.token, record.position_key.address, s.exchange, s.notional
        ),
        AlertKind::PartialLiquidation => format!(
            "partial liquidation: {} {} {} on {} — notional now ${}",
            s.side, s.token, record.position_key.address, s.exchange, s.notional
        ),
        AlertKind::CollateralAdded => format!(
            "collateral added: {} {} {} on {} — distance now {}%",
            s.side, s.token, record.position_key.address, s.exchange, s.distance_pct
        ),
        AlertKind::Imminent => format!(
            "IMMINENT LIQUIDATION: {} {} {} on {} — distance {}% (liq {})",
            s.side,
            s.token,
            record.position_key.address,
            s.exchange,
            s.distance_pct,
            s.liquidation_price.map(|p| p.to_string()).unwrap_or_default()
        ),
        AlertKind::Approaching => format!(
            "approaching liquidation: {} {} {} on {} — distance {}%",
            s.side, s.token, record.position_key.address, s.exchange, s.distance_pct
        ),
        AlertKind::SilentUpdate => {
            warn!("formatting a silent-update alert should never happen");
            String::new()
        }
    }
}

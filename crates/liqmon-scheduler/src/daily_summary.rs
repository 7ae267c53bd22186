//! Daily summary scheduler: at a configured wall-clock instant, snapshots
//! the cache grouped by tier and emits one summary message. No dedup — it
//! runs once per scheduled instant by construction.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use liqmon_cache::PositionCache;
use liqmon_core::{CachedPosition, Tier};
use liqmon_detector::MessageSink;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DailySummaryConfig {
    pub trigger_time: NaiveTime,
    pub timezone: Tz,
}

impl Default for DailySummaryConfig {
    fn default() -> Self {
        Self {
            trigger_time: NaiveTime::from_hms_opt(6, 0, 0).expect("valid time"),
            timezone: chrono_tz::America::New_York,
        }
    }
}

pub struct DailySummaryScheduler<S> {
    cache: Arc<PositionCache>,
    sink: Arc<S>,
    config: DailySummaryConfig,
}

impl<S: MessageSink + 'static> DailySummaryScheduler<S> {
    pub fn new(cache: Arc<PositionCache>, sink: Arc<S>, config: DailySummaryConfig) -> Self {
        Self { cache, sink, config }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let sleep = self.time_until_next_trigger(Utc::now());
            info!(seconds = sleep.num_seconds(), "daily summary sleeping until next trigger");
            let sleep_std = sleep.to_std().unwrap_or(std::time::Duration::from_secs(60));
            tokio::select! {
                _ = tokio::time::sleep(sleep_std) => {}
                _ = shutdown.changed() => { continue; }
            }
            if *shutdown.borrow() {
                return;
            }
            self.emit_summary().await;
        }
    }

    /// Duration until the next occurrence of `trigger_time` in `timezone`,
    /// computed from a UTC instant.
    fn time_until_next_trigger(&self, now: DateTime<Utc>) -> chrono::Duration {
        let local_now = now.with_timezone(&self.config.timezone);
        let today_trigger = local_now.date_naive().and_time(self.config.trigger_time);
        let next_local = if local_now.naive_local() < today_trigger {
            today_trigger
        } else {
            today_trigger + chrono::Duration::days(1)
        };
        let next_utc = self
            .config
            .timezone
            .from_local_datetime(&next_local)
            .single()
            .unwrap_or_else(|| self.config.timezone.from_utc_datetime(&next_local))
            .with_timezone(&Utc);
        (next_utc - now).max(chrono::Duration::zero())
    }

    pub async fn emit_summary(&self) {
        let snapshot = self.cache.snapshot();
        let text = format_summary(&snapshot);
        self.sink.send(text).await;
    }
}

fn format_summary(entries: &[CachedPosition]) -> String {
    let mut by_tier: Vec<&CachedPosition> = entries.iter().collect();
    by_tier.sort_by_key(|e| e.tier);

    let mut out = String::new();
    let _ = writeln!(out, "Daily position summary ({} tracked)", entries.len());
    for tier in [Tier::Critical, Tier::High, Tier::Normal] {
        let tier_entries: Vec<&&CachedPosition> = by_tier.iter().filter(|e| e.tier == tier).collect();
        if tier_entries.is_empty() {
            continue;
        }
        let _ = writeln!(out, "-- {tier:?} ({}) --", tier_entries.len());
        for entry in tier_entries {
            let _ = writeln!(
                out,
                "{} {:?} {:?} notional={} distance={}% liq={}",
                entry.position.key.token,
                entry.position.key.side,
                entry.position.key.exchange,
                entry.position.notional,
                entry.distance_pct,
                entry
                    .position
                    .liquidation_price
                    .map(|p| p.inner().to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use liqmon_core::{Exchange, MarginType, Position, PositionKey, Price, Side, Size, TierThresholds};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

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

    fn addr() -> liqmon_core::WalletAddress {
        liqmon_core::WalletAddress::parse("0x000000000000000000000000000000000000aa").unwrap()
    }

    fn position() -> Position {
        Position {
            key: PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long),
            size: Size::new(dec!(1)),
            entry_price: Price::new(dec!(95000)),
            mark_price: Price::new(dec!(100000)),
            liquidation_price: Some(Price::new(dec!(99000))),
            notional: dec!(100000),
            leverage: dec!(10),
            margin_type: MarginType::Cross,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn emit_summary_sends_one_message_containing_every_cached_position() {
        let cache = Arc::new(PositionCache::new(TierThresholds::default()));
        cache.apply_observation(position(), Utc::now());
        let sink = Arc::new(RecordingSink::default());
        let scheduler = DailySummaryScheduler::new(cache, sink.clone(), DailySummaryConfig::default());

        scheduler.emit_summary().await;

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("BTC"));
    }

    #[test]
    fn next_trigger_is_always_in_the_future() {
        let cache = Arc::new(PositionCache::new(TierThresholds::default()));
        let sink = Arc::new(RecordingSink::default());
        let scheduler = DailySummaryScheduler::new(cache, sink, DailySummaryConfig::default());
        let now = Utc::now();
        let wait = scheduler.time_until_next_trigger(now);
        assert!(wait >= chrono::Duration::zero());
        assert!(wait <= chrono::Duration::days(1));
    }
}

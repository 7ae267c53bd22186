//! Position cache: the single primary mutable structure,
//! indexed both by position key and by `(tier, next_refresh_deadline)`.
//!
//! The whole structure sits behind one reader/writer lock rather than a
//! per-entry guard, because the deadline heap and the key index must stay
//! consistent with each other on every write.

use chrono::{DateTime, Utc};
use liqmon_core::{CachedPosition, Position, PositionKey, Tier, TierThresholds};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;

/// What happened to a cache entry as a result of applying an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The position was not previously cached and now is.
    Inserted,
    /// An existing entry was refreshed with new data.
    Updated { previous: CachedPosition },
    /// The observation was discarded because it predates the cached state.
    Stale,
    /// The position fell outside the watch window and had no prior
    /// higher-urgency tier to protect it, so it was dropped.
    Evicted { previous: CachedPosition },
}

/// A heap entry ordered by deadline (earliest first via `Reverse` ordering).
/// `generation` lets `pop_due` detect and discard entries superseded by a
/// later refresh without having to mutate the heap on every update.
#[derive(Debug, Clone, Eq, PartialEq)]
struct DeadlineEntry {
    deadline: DateTime<Utc>,
    key: PositionKey,
    generation: u64,
}

impl Ord for DeadlineEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline sorts highest.
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for DeadlineEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    entries: HashMap<PositionKey, CachedPosition>,
    heap: BinaryHeap<DeadlineEntry>,
}

pub struct PositionCache {
    thresholds: TierThresholds,
    inner: RwLock<Inner>,
}

impl PositionCache {
    pub fn new(thresholds: TierThresholds) -> Self {
        Self {
            thresholds,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                heap: BinaryHeap::new(),
            }),
        }
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.thresholds
    }

    /// Restore an entry loaded from persistence at startup. Does not apply
    /// staleness or eligibility checks; the caller is expected to revalidate
    /// the distance lazily on the entry's first live refresh.
    pub fn restore(&self, entry: CachedPosition) {
        let mut guard = self.inner.write();
        guard.heap.push(DeadlineEntry {
            deadline: entry.next_refresh_deadline,
            key: entry.position.key.clone(),
            generation: entry.generation,
        });
        guard.entries.insert(entry.position.key.clone(), entry);
    }

    /// Apply a freshly observed position to the cache, enforcing staleness
    /// rejection, tier classification, eviction and hysteresis re-arming.
    pub fn apply_observation(&self, position: Position, now: DateTime<Utc>) -> ApplyOutcome {
        let mut guard = self.inner.write();
        let key = position.key.clone();

        if let Some(existing) = guard.entries.get(&key) {
            if position.last_updated < existing.position.last_updated {
                debug!(%key, "discarding stale observation");
                return ApplyOutcome::Stale;
            }
        }

        let Some(liq) = position.liquidation_price else {
            return match guard.entries.remove(&key) {
                Some(previous) => ApplyOutcome::Evicted { previous },
                None => ApplyOutcome::Stale,
            };
        };
        let _ = liq;

        let distance_pct = match position.distance_pct() {
            Some(d) => d,
            None => {
                return match guard.entries.remove(&key) {
                    Some(previous) => ApplyOutcome::Evicted { previous },
                    None => ApplyOutcome::Stale,
                };
            }
        };

        let new_tier = self.thresholds.classify(distance_pct);
        let previous = guard.entries.get(&key).cloned();

        let tier = match new_tier {
            Some(t) => t,
            None => {
                // Outside the watch window: keep only if it was previously
                // at a more urgent tier than `normal`.
                match &previous {
                    Some(prev) if prev.tier != Tier::Normal => prev.tier,
                    Some(prev) => {
                        let previous = prev.clone();
                        guard.entries.remove(&key);
                        return ApplyOutcome::Evicted { previous };
                    }
                    None => return ApplyOutcome::Stale,
                }
            }
        };

        let next_deadline = now + chrono::Duration::milliseconds(self.thresholds.period_ms(tier) as i64);
        let generation = previous.as_ref().map(|p| p.generation + 1).unwrap_or(0);

        let mut approaching_alerted = previous.as_ref().map(|p| p.approaching_alerted).unwrap_or(false);
        let mut critical_alerted = previous.as_ref().map(|p| p.critical_alerted).unwrap_or(false);
        if distance_pct > self.thresholds.approaching_rearm_pct {
            approaching_alerted = false;
        }
        if distance_pct > self.thresholds.critical_rearm_pct {
            critical_alerted = false;
        }

        let prev_liquidation_price = previous.as_ref().and_then(|p| p.position.liquidation_price);
        let prev_notional = previous.as_ref().map(|p| p.position.notional);

        let entry = CachedPosition {
            position,
            distance_pct,
            tier,
            last_refresh: now,
            next_refresh_deadline: next_deadline,
            approaching_alerted,
            critical_alerted,
            prev_liquidation_price,
            prev_notional,
            generation,
        };

        guard.heap.push(DeadlineEntry {
            deadline: next_deadline,
            key: key.clone(),
            generation,
        });
        guard.entries.insert(key, entry);

        match previous {
            Some(previous) => ApplyOutcome::Updated { previous },
            None => ApplyOutcome::Inserted,
        }
    }

    /// Remove an entry because the wallet's latest fetch no longer returned
    /// it (a full liquidation).
    pub fn remove(&self, key: &PositionKey) -> Option<CachedPosition> {
        self.inner.write().entries.remove(key)
    }

    pub fn get(&self, key: &PositionKey) -> Option<CachedPosition> {
        self.inner.read().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Set `critical_alerted` after the alerter emits an `imminent` alert.
    pub fn mark_critical_alerted(&self, key: &PositionKey) {
        if let Some(entry) = self.inner.write().entries.get_mut(key) {
            entry.critical_alerted = true;
        }
    }

    /// Set `approaching_alerted` after the alerter emits an `approaching` alert.
    pub fn mark_approaching_alerted(&self, key: &PositionKey) {
        if let Some(entry) = self.inner.write().entries.get_mut(key) {
            entry.approaching_alerted = true;
        }
    }

    /// Push a due-but-unrefreshed entry's deadline forward without touching
    /// its data, for when a fetch attempt is exhausted and must be retried
    /// on the next ordinary cycle — a skipped refresh is not a fatal error.
    pub fn reschedule(&self, key: &PositionKey, next_deadline: DateTime<Utc>) {
        let mut guard = self.inner.write();
        let Some(entry) = guard.entries.get_mut(key) else {
            return;
        };
        entry.generation += 1;
        entry.next_refresh_deadline = next_deadline;
        let generation = entry.generation;
        guard.heap.push(DeadlineEntry {
            deadline: next_deadline,
            key: key.clone(),
            generation,
        });
    }

    /// Pop the single most-overdue position whose deadline has passed, or
    /// `None` if nothing is due yet.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<PositionKey> {
        let mut guard = self.inner.write();
        loop {
            let top = guard.heap.peek()?;
            if top.deadline > now {
                return None;
            }
            let candidate = guard.heap.pop().unwrap();
            match guard.entries.get(&candidate.key) {
                Some(entry) if entry.generation == candidate.generation => {
                    return Some(candidate.key);
                }
                // Superseded by a later refresh or since evicted; discard and keep looking.
                _ => continue,
            }
        }
    }

    /// Earliest outstanding deadline, for the scheduler to sleep until.
    pub fn earliest_deadline(&self) -> Option<DateTime<Utc>> {
        self.inner.read().heap.peek().map(|e| e.deadline)
    }

    /// Every cached key belonging to the same wallet and exchange, for the
    /// scheduler's wallet/exchange coalescing pass.
    pub fn keys_for_wallet_exchange(
        &self,
        address: &liqmon_core::WalletAddress,
        exchange: liqmon_core::Exchange,
    ) -> Vec<PositionKey> {
        self.inner
            .read()
            .entries
            .keys()
            .filter(|k| &k.address == address && k.exchange == exchange)
            .cloned()
            .collect()
    }

    /// All cached positions, for the daily summary scheduler.
    pub fn snapshot(&self) -> Vec<CachedPosition> {
        self.inner.read().entries.values().cloned().collect()
    }

    /// Truncate every entry. Used by the `--clear-cache` CLI operation;
    /// the wallet registry is untouched.
    pub fn clear(&self) {
        let mut guard = self.inner.write();
        guard.entries.clear();
        guard.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use liqmon_core::{Exchange, MarginType, Price, Side, Size, WalletAddress};
    use rust_decimal_macros::dec;

    fn addr() -> WalletAddress {
        WalletAddress::parse("0x000000000000000000000000000000000000aa").unwrap()
    }

    fn position(mark: rust_decimal::Decimal, liq: Option<rust_decimal::Decimal>, notional: rust_decimal::Decimal, when: DateTime<Utc>) -> Position {
        Position {
            key: PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long),
            size: Size::new(dec!(1)),
            entry_price: Price::new(dec!(95000)),
            mark_price: Price::new(mark),
            liquidation_price: liq.map(Price::new),
            notional,
            leverage: dec!(10),
            margin_type: MarginType::Cross,
            last_updated: when,
        }
    }

    #[test]
    fn inserts_new_position_as_critical() {
        let cache = PositionCache::new(TierThresholds::default());
        let now = Utc::now();
        let outcome = cache.apply_observation(position(dec!(100000), Some(dec!(99900)), dec!(100000), now), now);
        assert_eq!(outcome, ApplyOutcome::Inserted);
        let entry = cache.get(&PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long)).unwrap();
        assert_eq!(entry.tier, Tier::Critical);
    }

    #[test]
    fn rejects_stale_observation() {
        let cache = PositionCache::new(TierThresholds::default());
        let now = Utc::now();
        cache.apply_observation(position(dec!(100000), Some(dec!(99000)), dec!(100000), now), now);
        let stale = position(dec!(100000), Some(dec!(99000)), dec!(100000), now - Duration::seconds(5));
        assert_eq!(cache.apply_observation(stale, now), ApplyOutcome::Stale);
    }

    #[test]
    fn evicts_when_liquidation_price_absent() {
        let cache = PositionCache::new(TierThresholds::default());
        let now = Utc::now();
        cache.apply_observation(position(dec!(100000), Some(dec!(99000)), dec!(100000), now), now);
        let later = now + Duration::seconds(1);
        let outcome = cache.apply_observation(position(dec!(100000), None, dec!(100000), later), later);
        assert!(matches!(outcome, ApplyOutcome::Evicted { .. }));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn retains_out_of_window_entry_if_previously_critical() {
        let cache = PositionCache::new(TierThresholds::default());
        let now = Utc::now();
        // distance 1.0% -> normal tier first so "previously higher" is false.
        cache.apply_observation(position(dec!(100000), Some(dec!(99000)), dec!(100000), now), now);
        let later = now + Duration::seconds(1);
        // move far out of the watch window (> 5%)
        let outcome = cache.apply_observation(position(dec!(100000), Some(dec!(80000)), dec!(100000), later), later);
        assert!(matches!(outcome, ApplyOutcome::Evicted { .. }));
    }

    #[test]
    fn pop_due_respects_deadline() {
        let cache = PositionCache::new(TierThresholds::default());
        let now = Utc::now();
        cache.apply_observation(position(dec!(100000), Some(dec!(99900)), dec!(100000), now), now);
        assert!(cache.pop_due(now).is_none());
        let due_at = now + Duration::milliseconds(600);
        let key = cache.pop_due(due_at).unwrap();
        assert_eq!(key.token, "BTC");
    }

    #[test]
    fn approaching_flag_rearms_above_hysteresis_margin() {
        let cache = PositionCache::new(TierThresholds::default());
        let now = Utc::now();
        // 0.20% distance -> high tier, manually mark approaching_alerted.
        cache.apply_observation(position(dec!(100000), Some(dec!(99800)), dec!(100000), now), now);
        {
            let mut guard = cache.inner.write();
            let key = PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long);
            guard.entries.get_mut(&key).unwrap().approaching_alerted = true;
        }
        let later = now + Duration::seconds(1);
        // distance rises to 0.40%, above the 0.30% rearm margin.
        cache.apply_observation(position(dec!(100000), Some(dec!(99600)), dec!(100000), later), later);
        let entry = cache.get(&PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long)).unwrap();
        assert!(!entry.approaching_alerted);
    }
}

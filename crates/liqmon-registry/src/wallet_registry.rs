//! In-memory wallet registry: a concurrent map of `Arc<RwLock<Wallet>>`,
//! one lock per address so unrelated wallets never contend.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use liqmon_core::{DiscoverySource, FrequencyClass, Wallet, WalletAddress};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::debug;

/// Threshold above which a wallet is scanned at `normal` cadence.
const NORMAL_FREQUENCY_FLOOR: Decimal = dec!(60_000);

/// `infrequent` wallets are re-scanned once a day.
const INFREQUENT_INTERVAL: ChronoDuration = ChronoDuration::hours(24);

type Entry = Arc<RwLock<Wallet>>;

/// Append-only registry of wallet addresses. Entries are only ever added
/// or updated, never removed; `size()` is therefore
/// monotonically non-decreasing across any sequence of calls.
#[derive(Default)]
pub struct WalletRegistry {
    wallets: DashMap<WalletAddress, Entry>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a wallet loaded from persistence at startup. Does not apply
    /// the merge rule; callers must not restore the same address twice.
    pub fn restore(&self, wallet: Wallet) {
        self.wallets
            .insert(wallet.address, Arc::new(RwLock::new(wallet)));
    }

    /// Insert a newly discovered address, or merge into an existing one
    /// per the rediscovery merge rule: keep the earliest
    /// `first_seen`, union source tags, prefer the most informative cohort
    /// label (non-null wins; existing kept if already set).
    pub fn upsert(
        &self,
        address: WalletAddress,
        source: DiscoverySource,
        cohort: Option<String>,
        aggregate_value: Option<Decimal>,
        now: DateTime<Utc>,
    ) {
        match self.wallets.get(&address) {
            Some(entry) => {
                let mut wallet = entry.write();
                wallet.merge_from(source, cohort, now);
                if let Some(value) = aggregate_value {
                    wallet.last_aggregate_value = Some(value);
                    wallet.frequency =
                        FrequencyClass::from_aggregate_value(value, NORMAL_FREQUENCY_FLOOR);
                }
            }
            None => {
                let mut wallet = Wallet::new(address, source, cohort, now);
                if let Some(value) = aggregate_value {
                    wallet.last_aggregate_value = Some(value);
                    wallet.frequency =
                        FrequencyClass::from_aggregate_value(value, NORMAL_FREQUENCY_FLOOR);
                }
                debug!(%address, source = %source, "registered new wallet");
                self.wallets.insert(address, Arc::new(RwLock::new(wallet)));
            }
        }
    }

    /// Record the outcome of a discovery-loop scan. Promotes/demotes the
    /// wallet's frequency class from the fresh aggregate value.
    pub fn mark_scanned(&self, address: &WalletAddress, aggregate_value: Decimal, _positions_found: usize, now: DateTime<Utc>) {
        if let Some(entry) = self.wallets.get(address) {
            let mut wallet = entry.write();
            wallet.last_aggregate_value = Some(aggregate_value);
            wallet.frequency = FrequencyClass::from_aggregate_value(aggregate_value, NORMAL_FREQUENCY_FLOOR);
            wallet.last_scanned = Some(now);
            wallet.scan_count += 1;
        }
    }

    /// Addresses due for scanning right now: never scanned,
    /// `normal` frequency (always due at the start of a discovery cycle),
    /// or `infrequent` and at least 24h since the last scan.
    pub fn iter_due(&self, now: DateTime<Utc>) -> Vec<WalletAddress> {
        self.wallets
            .iter()
            .filter_map(|kv| {
                let wallet = kv.value().read();
                let due = match wallet.last_scanned {
                    None => true,
                    Some(last) => match wallet.frequency {
                        FrequencyClass::Normal => true,
                        FrequencyClass::Infrequent => now - last >= INFREQUENT_INTERVAL,
                    },
                };
                due.then_some(wallet.address)
            })
            .collect()
    }

    pub fn size(&self) -> usize {
        self.wallets.len()
    }

    pub fn get(&self, address: &WalletAddress) -> Option<Wallet> {
        self.wallets.get(address).map(|e| e.read().clone())
    }

    pub fn all(&self) -> Vec<Wallet> {
        self.wallets.iter().map(|kv| kv.value().read().clone()).collect()
    }
}

//! Wallet registry entry types.

use crate::address::WalletAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Where a wallet was first (or again) observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    Cohort,
    LiquidationHistory,
    Manual,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoverySource::Cohort => "cohort",
            DiscoverySource::LiquidationHistory => "liquidation-history",
            DiscoverySource::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

/// How often the discovery loop revisits this wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyClass {
    Normal,
    Infrequent,
}

impl fmt::Display for FrequencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyClass::Normal => write!(f, "normal"),
            FrequencyClass::Infrequent => write!(f, "infrequent"),
        }
    }
}

impl FrequencyClass {
    /// `normal` when the last observed aggregate value is >= $60K, else `infrequent`.
    pub fn from_aggregate_value(aggregate_value: rust_decimal::Decimal, normal_floor: rust_decimal::Decimal) -> Self {
        if aggregate_value >= normal_floor {
            FrequencyClass::Normal
        } else {
            FrequencyClass::Infrequent
        }
    }
}

/// A registered wallet. Append-only: `upsert`/`mark_scanned` only ever add
/// or update fields, never remove an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub address: WalletAddress,
    pub sources: BTreeSet<DiscoverySource>,
    pub cohort: Option<String>,
    pub last_aggregate_value: Option<rust_decimal::Decimal>,
    pub frequency: FrequencyClass,
    pub first_seen: DateTime<Utc>,
    pub last_scanned: Option<DateTime<Utc>>,
    pub scan_count: u64,
}

impl Wallet {
    pub fn new(address: WalletAddress, source: DiscoverySource, cohort: Option<String>, now: DateTime<Utc>) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source);
        Self {
            address,
            sources,
            cohort,
            last_aggregate_value: None,
            frequency: FrequencyClass::Infrequent,
            first_seen: now,
            last_scanned: None,
            scan_count: 0,
        }
    }

    /// Merge rule for rediscovery from a different source:
    /// keep the earliest `first_seen`, union source tags, prefer the most
    /// informative cohort label.
    pub fn merge_from(&mut self, other_source: DiscoverySource, other_cohort: Option<String>, other_first_seen: DateTime<Utc>) {
        self.sources.insert(other_source);
        if other_first_seen < self.first_seen {
            self.first_seen = other_first_seen;
        }
        if self.cohort.is_none() {
            self.cohort = other_cohort;
        }
    }
}

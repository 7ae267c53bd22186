//! Position identity, snapshot data, and tier classification.

use crate::address::WalletAddress;
use crate::decimal::{Price, Size};
use crate::exchange::Exchange;
use crate::side::{MarginType, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite identity of a watched position: `(address, token, exchange, side)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub address: WalletAddress,
    pub token: String,
    pub exchange: Exchange,
    pub side: Side,
}

impl PositionKey {
    pub fn new(address: WalletAddress, token: impl Into<String>, exchange: Exchange, side: Side) -> Self {
        Self {
            address,
            token: token.into(),
            exchange,
            side,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.address, self.exchange, self.token, self.side
        )
    }
}

/// A freshly observed position snapshot, as returned by a single refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub key: PositionKey,
    pub size: Size,
    pub entry_price: Price,
    pub mark_price: Price,
    /// Absent liquidation price means the position is not eligible for monitoring.
    pub liquidation_price: Option<Price>,
    pub notional: Decimal,
    pub leverage: Decimal,
    pub margin_type: MarginType,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl Position {
    /// `distance_pct`: signed percent move from mark to liquidation, positive
    /// while solvent. Always recomputed from mark/liquidation price, never
    /// trusted from upstream.
    pub fn distance_pct(&self) -> Option<Decimal> {
        let liq = self.liquidation_price?;
        if self.mark_price.is_zero() {
            return None;
        }
        let mark = self.mark_price.inner();
        let liq = liq.inner();
        let pct = match self.key.side {
            Side::Long => (mark - liq) / mark * Decimal::from(100),
            Side::Short => (liq - mark) / mark * Decimal::from(100),
        };
        Some(pct)
    }
}

/// Urgency classification for a cached position. Ordered from most to
/// least urgent; refresh cadence is keyed off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Critical,
    High,
    Normal,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Critical => write!(f, "critical"),
            Tier::High => write!(f, "high"),
            Tier::Normal => write!(f, "normal"),
        }
    }
}

/// The thresholds and refresh periods that make tier classification a pure
/// function of `distance_pct`. Loaded from configuration so
/// an operator can retune without recompiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub critical_max_pct: Decimal,
    pub high_max_pct: Decimal,
    pub max_watch_pct: Decimal,
    pub critical_period_ms: u64,
    pub high_period_ms: u64,
    pub normal_period_ms: u64,
    /// Hysteresis margins for re-arming alert flags, expressed as absolute
    /// `distance_pct` thresholds the value must rise above.
    pub approaching_rearm_pct: Decimal,
    pub critical_rearm_pct: Decimal,
}

impl Default for TierThresholds {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            critical_max_pct: dec!(0.125),
            high_max_pct: dec!(0.25),
            max_watch_pct: dec!(5),
            critical_period_ms: 500,
            high_period_ms: 3_000,
            normal_period_ms: 30_000,
            approaching_rearm_pct: dec!(0.30),
            critical_rearm_pct: dec!(0.15),
        }
    }
}

impl TierThresholds {
    /// Pure classification function. `None` means the position is outside
    /// the watch window (already past liquidation, or beyond `max_watch`)
    /// and is a candidate for eviction unless it was previously watched at
    /// a higher tier (the cache, not this function, owns that retention rule).
    pub fn classify(&self, distance_pct: Decimal) -> Option<Tier> {
        if distance_pct <= Decimal::ZERO || distance_pct > self.max_watch_pct {
            return None;
        }
        if distance_pct <= self.critical_max_pct {
            Some(Tier::Critical)
        } else if distance_pct <= self.high_max_pct {
            Some(Tier::High)
        } else {
            Some(Tier::Normal)
        }
    }

    pub fn period_ms(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Critical => self.critical_period_ms,
            Tier::High => self.high_period_ms,
            Tier::Normal => self.normal_period_ms,
        }
    }
}

/// A `Position` plus the cache's bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPosition {
    pub position: Position,
    pub distance_pct: Decimal,
    pub tier: Tier,
    pub last_refresh: chrono::DateTime<chrono::Utc>,
    pub next_refresh_deadline: chrono::DateTime<chrono::Utc>,
    pub approaching_alerted: bool,
    pub critical_alerted: bool,
    pub prev_liquidation_price: Option<Price>,
    pub prev_notional: Option<Decimal>,
    pub generation: u64,
}

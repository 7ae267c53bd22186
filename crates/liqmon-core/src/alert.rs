//! Alert classification and record types.

use crate::position::PositionKey;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The classified kind of a detected state transition, in priority order
///: a full liquidation always outranks a partial one, and so
/// on down to a silent update, which never produces an outbound alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    FullLiquidation,
    PartialLiquidation,
    CollateralAdded,
    Imminent,
    Approaching,
    SilentUpdate,
}

impl AlertKind {
    /// `silent-update` never reaches the outbound sink or the alert log.
    pub fn is_emittable(&self) -> bool {
        !matches!(self, AlertKind::SilentUpdate)
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::FullLiquidation => "full-liquidation",
            AlertKind::PartialLiquidation => "partial-liquidation",
            AlertKind::CollateralAdded => "collateral-added",
            AlertKind::Imminent => "imminent",
            AlertKind::Approaching => "approaching",
            AlertKind::SilentUpdate => "silent-update",
        };
        write!(f, "{s}")
    }
}

/// A durable record of an emitted alert, used for cross-restart dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub position_key: PositionKey,
    pub kind: AlertKind,
    pub emitted_at: DateTime<Utc>,
    pub day_bucket: String,
    pub summary: AlertSummary,
}

/// The human-readable fields carried in an outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSummary {
    pub token: String,
    pub side: String,
    pub exchange: String,
    pub notional: Decimal,
    pub distance_pct: Decimal,
    pub liquidation_price: Option<Decimal>,
}

impl AlertRecord {
    pub fn day_bucket_for(ts: DateTime<Utc>) -> String {
        ts.format("%Y-%m-%d").to_string()
    }
}

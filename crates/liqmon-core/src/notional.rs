//! Per-token notional thresholds. Positions below threshold
//! are never inserted into the cache.

use crate::side::MarginType;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cross-margin threshold for tokens with no explicit entry.
pub const DEFAULT_CROSS_THRESHOLD: Decimal = dec!(300_000);

/// Isolated-margin positions use a 5x lower threshold than cross.
pub const ISOLATED_DISCOUNT: Decimal = dec!(5);

/// Configuration-loaded per-token cross-margin thresholds, keyed by the
/// unprefixed coin symbol (callers strip the exchange's coin prefix first
/// via [`crate::Exchange::strip_prefix`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionalThresholds {
    #[serde(default)]
    per_token_cross: HashMap<String, Decimal>,
    #[serde(default = "default_cross_threshold")]
    default_cross: Decimal,
}

fn default_cross_threshold() -> Decimal {
    DEFAULT_CROSS_THRESHOLD
}

impl Default for NotionalThresholds {
    fn default() -> Self {
        Self {
            per_token_cross: HashMap::new(),
            default_cross: DEFAULT_CROSS_THRESHOLD,
        }
    }
}

impl NotionalThresholds {
    pub fn with_overrides(per_token_cross: HashMap<String, Decimal>, default_cross: Decimal) -> Self {
        Self {
            per_token_cross,
            default_cross,
        }
    }

    /// Minimum notional (in quote currency) a position must meet to be
    /// watched, for the given unprefixed token and margin type.
    pub fn threshold_for(&self, token: &str, margin_type: MarginType) -> Decimal {
        let cross = self
            .per_token_cross
            .get(token)
            .copied()
            .unwrap_or(self.default_cross);
        match margin_type {
            MarginType::Cross => cross,
            MarginType::Isolated => cross / ISOLATED_DISCOUNT,
        }
    }

    pub fn meets_threshold(&self, token: &str, margin_type: MarginType, notional: Decimal) -> bool {
        notional.abs() >= self.threshold_for(token, margin_type)
    }
}

//! Detector configuration: the thresholds that decide which state
//! transition fired. Tier thresholds (0.125% imminent,
//! 0.25% approaching) live on [`liqmon_core::TierThresholds`] and are
//! shared with the cache rather than duplicated here.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// A refresh counts as `partial-liquidation` when notional drops by at
    /// least this fraction of the previous notional, same side, smaller size.
    #[serde(default = "default_partial_liquidation_drop_pct")]
    pub partial_liquidation_drop_pct: Decimal,
    /// Minimum liquidation-price move, as a percent of the previous price,
    /// for a same-size change to count as `collateral-added`.
    #[serde(default = "default_collateral_min_liq_move_pct")]
    pub collateral_min_liq_move_pct: Decimal,
}

fn default_partial_liquidation_drop_pct() -> Decimal {
    dec!(0.10)
}

fn default_collateral_min_liq_move_pct() -> Decimal {
    dec!(0.5)
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            partial_liquidation_drop_pct: default_partial_liquidation_drop_pct(),
            collateral_min_liq_move_pct: default_collateral_min_liq_move_pct(),
        }
    }
}

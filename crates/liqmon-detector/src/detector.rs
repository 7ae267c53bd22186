//! State-change classification.
//!
//! Given the cache entry as it stood before a refresh and as it stands
//! after, decides which single [`AlertKind`] fired. Natural price movement
//! with the liquidation price and size unchanged never produces an alert on
//! its own; only the highest-priority applicable kind fires per refresh.

use crate::config::DetectorConfig;
use liqmon_core::{AlertKind, CachedPosition, Side, TierThresholds};
use rust_decimal::Decimal;

pub struct StateChangeDetector {
    config: DetectorConfig,
    tier_thresholds: TierThresholds,
}

impl StateChangeDetector {
    pub fn new(config: DetectorConfig, tier_thresholds: TierThresholds) -> Self {
        Self { config, tier_thresholds }
    }

    /// The wallet's latest fetch no longer returned this key. Full
    /// liquidation is the only possible classification here; callers must
    /// not invoke this when the fetch itself failed (a transport error is
    /// not evidence of liquidation).
    pub fn classify_absence(&self) -> AlertKind {
        AlertKind::FullLiquidation
    }

    /// A refresh returned data for a key that was already cached. Exactly
    /// one kind is returned, chosen by priority
    /// `partial > collateral > imminent > approaching > silent`
    /// (full-liquidation is only reachable via [`Self::classify_absence`]).
    pub fn classify(&self, prev: &CachedPosition, new: &CachedPosition) -> AlertKind {
        if self.is_partial_liquidation(prev, new) {
            return AlertKind::PartialLiquidation;
        }
        if self.is_collateral_added(prev, new) {
            return AlertKind::CollateralAdded;
        }
        if new.distance_pct <= self.imminent_threshold(new) && !prev.critical_alerted {
            return AlertKind::Imminent;
        }
        if new.distance_pct <= self.approaching_threshold(new) && !prev.approaching_alerted {
            return AlertKind::Approaching;
        }
        AlertKind::SilentUpdate
    }

    fn imminent_threshold(&self, new: &CachedPosition) -> Decimal {
        // Tier thresholds travel with the cached position's own classification
        // so detector and cache never disagree about what "critical" means.
        let _ = new;
        self.tier_thresholds.critical_max_pct
    }

    fn approaching_threshold(&self, new: &CachedPosition) -> Decimal {
        let _ = new;
        self.tier_thresholds.high_max_pct
    }

    fn is_partial_liquidation(&self, prev: &CachedPosition, new: &CachedPosition) -> bool {
        let threshold = prev.position.notional * (Decimal::ONE - self.config.partial_liquidation_drop_pct);
        new.position.notional < threshold
            && new.position.key.side == prev.position.key.side
            && new.position.size.inner().abs() < prev.position.size.inner().abs()
    }

    fn is_collateral_added(&self, prev: &CachedPosition, new: &CachedPosition) -> bool {
        let (Some(prev_liq), Some(new_liq)) =
            (prev.position.liquidation_price, new.position.liquidation_price)
        else {
            return false;
        };
        if new.position.size != prev.position.size {
            return false;
        }
        let delta = new_liq.inner() - prev_liq.inner();
        if delta == Decimal::ZERO {
            return false;
        }
        let safer = match new.position.key.side {
            Side::Long => delta < Decimal::ZERO,
            Side::Short => delta > Decimal::ZERO,
        };
        if !safer {
            return false;
        }
        let move_pct = (delta.abs() / prev_liq.inner().abs()) * Decimal::from(100);
        move_pct >= self.config.collateral_min_liq_move_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use liqmon_core::{Exchange, MarginType, Position, PositionKey, Price, Size, Tier, TierThresholds, WalletAddress};
    use rust_decimal_macros::dec;

    fn addr() -> WalletAddress {
        WalletAddress::parse("0x000000000000000000000000000000000000aa").unwrap()
    }

    fn base(mark: Decimal, liq: Decimal, size: Decimal, notional: Decimal) -> CachedPosition {
        let position = Position {
            key: PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long),
            size: Size::new(size),
            entry_price: Price::new(dec!(95000)),
            mark_price: Price::new(mark),
            liquidation_price: Some(Price::new(liq)),
            notional,
            leverage: dec!(10),
            margin_type: MarginType::Cross,
            last_updated: Utc::now(),
        };
        let distance_pct = position.distance_pct().unwrap();
        CachedPosition {
            position,
            distance_pct,
            tier: Tier::Normal,
            last_refresh: Utc::now(),
            next_refresh_deadline: Utc::now(),
            approaching_alerted: false,
            critical_alerted: false,
            prev_liquidation_price: None,
            prev_notional: None,
            generation: 0,
        }
    }

    #[test]
    fn detects_partial_liquidation() {
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        let prev = base(dec!(100000), dec!(99000), dec!(1.0), dec!(100000));
        let new = base(dec!(100000), dec!(99000), dec!(0.5), dec!(50000));
        assert_eq!(detector.classify(&prev, &new), AlertKind::PartialLiquidation);
    }

    #[test]
    fn detects_collateral_added_for_long() {
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        let prev = base(dec!(100000), dec!(99480), dec!(1.0), dec!(100000));
        let new = base(dec!(100000), dec!(98900), dec!(1.0), dec!(100000));
        assert_eq!(detector.classify(&prev, &new), AlertKind::CollateralAdded);
    }

    #[test]
    fn natural_price_movement_is_silent() {
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        let prev = base(dec!(100000), dec!(99000), dec!(1.0), dec!(100000));
        let new = base(dec!(100500), dec!(99000), dec!(1.0), dec!(100500));
        assert_eq!(detector.classify(&prev, &new), AlertKind::SilentUpdate);
    }

    #[test]
    fn imminent_requires_flag_not_already_set() {
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        let prev = base(dec!(100000), dec!(99900), dec!(1.0), dec!(100000));
        let mut already = base(dec!(100000), dec!(99900), dec!(1.0), dec!(100000));
        already.critical_alerted = true;
        let new = base(dec!(99910), dec!(99900), dec!(1.0), dec!(99910));
        assert_eq!(detector.classify(&prev, &new), AlertKind::Imminent);
        assert_eq!(detector.classify(&already, &new), AlertKind::SilentUpdate);
    }

    #[test]
    fn approaching_skipped_when_imminent_also_applies() {
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        let prev = base(dec!(100000), dec!(99000), dec!(1.0), dec!(100000));
        let new = base(dec!(99910), dec!(99900), dec!(1.0), dec!(99910));
        assert_eq!(detector.classify(&prev, &new), AlertKind::Imminent);
    }

    #[test]
    fn absence_is_always_full_liquidation() {
        let detector = StateChangeDetector::new(DetectorConfig::default(), TierThresholds::default());
        assert_eq!(detector.classify_absence(), AlertKind::FullLiquidation);
    }
}

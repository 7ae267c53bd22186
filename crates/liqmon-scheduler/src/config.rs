//! Aggregate configuration for the three scheduler loops.

use crate::daily_summary::DailySummaryConfig;
use crate::discovery::DiscoveryConfig;
use liqmon_detector::DetectorConfig;

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub discovery: DiscoveryConfig,
    pub daily_summary: DailySummaryConfig,
    pub detector: DetectorConfig,
}

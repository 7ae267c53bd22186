//! The three independent scheduling loops that drive the monitoring engine:
//! tiered refresh, wallet/position discovery, and the daily summary.

pub mod common;
pub mod config;
pub mod daily_summary;
pub mod discovery;
pub mod error;
pub mod refresh;

pub use config::SchedulerConfig;
pub use daily_summary::{DailySummaryConfig, DailySummaryScheduler};
pub use discovery::{DiscoveryConfig, DiscoveryLoop, LiquidationHistoryEntry, LiquidationHistorySource};
pub use error::{Result, SchedulerError};
pub use refresh::RefreshScheduler;

//! Shared domain types for the liquidation monitoring engine.
//!
//! - [`WalletAddress`]: a validated 20-byte hex address.
//! - [`Exchange`], [`Side`], [`MarginType`]: the small enumerated variants
//!   position identity is modeled with.
//! - [`Position`], [`PositionKey`], [`CachedPosition`], [`Tier`]: the
//!   position data model and its pure tier-classification function.
//! - [`Wallet`], [`DiscoverySource`], [`FrequencyClass`]: the wallet
//!   registry's entry type.
//! - [`AlertKind`], [`AlertRecord`]: the state-change detector's output.

pub mod address;
pub mod alert;
pub mod decimal;
pub mod error;
pub mod exchange;
pub mod notional;
pub mod position;
pub mod side;
pub mod wallet;

pub use address::WalletAddress;
pub use alert::{AlertKind, AlertRecord, AlertSummary};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use exchange::Exchange;
pub use notional::NotionalThresholds;
pub use position::{CachedPosition, Position, PositionKey, Tier, TierThresholds};
pub use side::{MarginType, Side};
pub use wallet::{DiscoverySource, FrequencyClass, Wallet};

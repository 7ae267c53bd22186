//! Wallet registry: tracks every address discovered by the cohort scan or
//! liquidation-history import, and decides which of them are due for a
//! fresh scan.

pub mod error;
pub mod wallet_registry;

pub use error::{RegistryError, Result};
pub use wallet_registry::WalletRegistry;

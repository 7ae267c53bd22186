//! Wallet address type.
//!
//! Wallets are identified by a 20-byte hex address, the same shape as an
//! Ethereum externally-owned account. `alloy::primitives::Address` already
//! validates and normalizes this shape, so it is reused rather than
//! hand-rolling hex parsing.

use crate::error::{CoreError, Result};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated 20-byte wallet address, displayed as lowercase `0x`-prefixed hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(Address);

impl WalletAddress {
    pub fn parse(raw: &str) -> Result<Self> {
        Address::from_str(raw)
            .map(Self)
            .map_err(|_| CoreError::InvalidAddress(raw.to_string()))
    }

    pub fn as_bytes(&self) -> [u8; 20] {
        self.0.into_array()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = CoreError;
    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_address() {
        let addr = WalletAddress::parse("0x000000000000000000000000000000000000aa").unwrap();
        assert_eq!(
            addr.to_string(),
            "0x000000000000000000000000000000000000aa"
        );
    }

    #[test]
    fn rejects_short_address() {
        assert!(WalletAddress::parse("0xaa").is_err());
    }

    #[test]
    fn case_insensitive_round_trip() {
        let a = WalletAddress::parse("0xABCDEF0000000000000000000000000000000A").unwrap();
        let b = WalletAddress::parse(&a.to_string()).unwrap();
        assert_eq!(a, b);
    }
}

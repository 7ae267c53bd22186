//! Exchange identifier.
//!
//! The exchange family is a small enumerated variant, not a trait-object
//! hierarchy — there's no open set of exchanges to extend at runtime.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five sub-exchanges positions can be held on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Main,
    Xyz,
    Flx,
    Hyna,
    Km,
}

impl Exchange {
    pub const ALL: [Exchange; 5] = [
        Exchange::Main,
        Exchange::Xyz,
        Exchange::Flx,
        Exchange::Hyna,
        Exchange::Km,
    ];

    /// The `dex` tag sent in upstream queries. `Main` uses the empty tag.
    pub fn dex_tag(&self) -> &'static str {
        match self {
            Exchange::Main => "",
            Exchange::Xyz => "xyz",
            Exchange::Flx => "flx",
            Exchange::Hyna => "hyna",
            Exchange::Km => "km",
        }
    }

    /// The coin-symbol prefix this exchange uses, if any (e.g. `xyz:SILVER`).
    /// Only `Xyz` prefixes symbols today.
    pub fn coin_prefix(&self) -> Option<&'static str> {
        match self {
            Exchange::Xyz => Some("xyz:"),
            _ => None,
        }
    }

    /// Strip this exchange's coin prefix, if present, for threshold lookups.
    pub fn strip_prefix<'a>(&self, coin: &'a str) -> &'a str {
        match self.coin_prefix() {
            Some(prefix) => coin.strip_prefix(prefix).unwrap_or(coin),
            None => coin,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Exchange::Main => "main",
            Exchange::Xyz => "xyz",
            Exchange::Flx => "flx",
            Exchange::Hyna => "hyna",
            Exchange::Km => "km",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Exchange {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "main" | "" => Ok(Exchange::Main),
            "xyz" => Ok(Exchange::Xyz),
            "flx" => Ok(Exchange::Flx),
            "hyna" => Ok(Exchange::Hyna),
            "km" => Ok(Exchange::Km),
            other => Err(CoreError::InvalidExchange(other.to_string())),
        }
    }
}

//! Rate-limited fetcher for the upstream exchange info and cohort endpoints.

pub mod client;
pub mod config;
pub mod error;
pub mod pacing;
pub mod wire;

pub use client::{CohortPage, ExchangeApi, RateLimitedFetcher};
pub use config::FetcherConfig;
pub use error::{FetcherError, Result};
pub use wire::CohortTrader;

//! Pacing, concurrency, and backoff configuration for the fetcher.
//!
//! These are configuration rather than literal constants so an operator
//! can retune the upstream budget without recompiling.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// `C`: maximum in-flight requests.
    pub concurrency: usize,
    /// `d_req`: minimum delay between successive completed requests, ms.
    pub request_delay_ms: u64,
    /// `B`: requests per burst before an extra pause is injected.
    pub burst_size: u32,
    /// `d_batch`: extra pause injected every `burst_size` requests, ms.
    pub batch_pause_ms: u64,
    /// `d_dex`: minimum delay between calls for distinct sub-exchanges
    /// against the same address, ms.
    pub dex_separation_ms: u64,
    /// Initial backoff delay on a 429/5xx/network error, ms.
    pub backoff_initial_ms: u64,
    /// Backoff cap, ms.
    pub backoff_max_ms: u64,
    /// Maximum retry attempts before surfacing `TransientUpstream`.
    pub backoff_max_attempts: u32,
    /// Per-call timeout, ms.
    pub request_timeout_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            request_delay_ms: 250,
            burst_size: 50,
            batch_pause_ms: 2_000,
            dex_separation_ms: 100,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 60_000,
            backoff_max_attempts: 5,
            request_timeout_ms: 10_000,
        }
    }
}

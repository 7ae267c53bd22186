//! Error types for liqmon-fetcher.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetcherError {
    /// Network error, 429, 5xx, or timeout. The fetcher retries these with
    /// backoff; this variant surfaces once retries are exhausted.
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    /// JSON parse or schema mismatch. Never retried.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, FetcherError>;

//! Concurrency admission and pacing for the REST fetcher: a bounded
//! in-flight semaphore plus three independent minimum-delay rules
//! (per-request, per-burst, per-address-dex).

use crate::config::FetcherConfig;
use liqmon_core::WalletAddress;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::warn;

struct PacingState {
    last_request_at: Option<Instant>,
    requests_since_batch: u32,
    last_dex_call: HashMap<(WalletAddress, &'static str), Instant>,
}

/// Serializes calls to the upstream API: at most `concurrency` in flight,
/// with per-request, per-burst, and per-(address, exchange) pacing delays
/// layered on top.
pub struct AdmissionGate {
    config: FetcherConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PacingState>,
}

impl AdmissionGate {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            config,
            state: Mutex::new(PacingState {
                last_request_at: None,
                requests_since_batch: 0,
                last_dex_call: HashMap::new(),
            }),
        }
    }

    /// Acquire a concurrency slot, then sleep as needed to respect pacing
    /// rules for a call against `address`'s position on `dex_tag`. The
    /// returned permit must be held until the upstream call completes.
    pub async fn admit(&self, address: Option<(&WalletAddress, &'static str)>) -> SemaphorePermit<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore never closed");

        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();

                let req_wait = state
                    .last_request_at
                    .map(|t| {
                        let min_gap = Duration::from_millis(self.config.request_delay_ms);
                        min_gap.saturating_sub(now.duration_since(t))
                    })
                    .unwrap_or_default();

                let batch_wait = if state.requests_since_batch >= self.config.burst_size {
                    Duration::from_millis(self.config.batch_pause_ms)
                } else {
                    Duration::ZERO
                };

                let dex_wait = address
                    .and_then(|(addr, dex)| state.last_dex_call.get(&(*addr, dex)))
                    .map(|t| {
                        let min_gap = Duration::from_millis(self.config.dex_separation_ms);
                        min_gap.saturating_sub(now.duration_since(*t))
                    })
                    .unwrap_or_default();

                let wait = req_wait.max(batch_wait).max(dex_wait);
                if wait.is_zero() {
                    state.last_request_at = Some(now);
                    state.requests_since_batch = if batch_wait.is_zero() {
                        state.requests_since_batch + 1
                    } else {
                        1
                    };
                    if let Some((addr, dex)) = address {
                        state.last_dex_call.insert((*addr, dex), now);
                    }
                    break;
                }
                Some(wait)
            };

            match wait {
                Some(d) => tokio::time::sleep(d).await,
                None => break,
            }
        }

        permit
    }
}

/// Exponential backoff with full jitter, capped, for a fixed number of
/// attempts.
pub async fn backoff_sleep(attempt: u32, config: &FetcherConfig) {
    use rand::Rng;
    let base = config.backoff_initial_ms.saturating_mul(1u64 << attempt.min(10));
    let capped = base.min(config.backoff_max_ms);
    let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
    warn!(attempt, delay_ms = jittered, "backing off after transient upstream error");
    tokio::time::sleep(Duration::from_millis(jittered)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_concurrency_immediately() {
        let gate = AdmissionGate::new(FetcherConfig {
            concurrency: 2,
            request_delay_ms: 0,
            dex_separation_ms: 0,
            ..FetcherConfig::default()
        });
        let p1 = gate.admit(None).await;
        let p2 = gate.admit(None).await;
        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn enforces_request_delay() {
        let gate = AdmissionGate::new(FetcherConfig {
            concurrency: 5,
            request_delay_ms: 30,
            burst_size: 1000,
            dex_separation_ms: 0,
            ..FetcherConfig::default()
        });
        let start = Instant::now();
        drop(gate.admit(None).await);
        drop(gate.admit(None).await);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}

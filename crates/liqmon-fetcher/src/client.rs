//! Typed fetcher operations wrapping the upstream info/GraphQL endpoints:
//! a single HTTP client, typed request structs posted to one URL, with
//! admission pacing and retry-with-backoff layered on top.

use crate::config::FetcherConfig;
use crate::error::{FetcherError, Result};
use crate::pacing::{backoff_sleep, AdmissionGate};
use crate::wire::*;
use async_trait::async_trait;
use chrono::Utc;
use liqmon_core::{Exchange, MarginType, Position, PositionKey, Side, WalletAddress};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// A page of the upstream wallet-discovery (cohort) query.
#[derive(Debug, Clone)]
pub struct CohortPage {
    pub traders: Vec<CohortTrader>,
    pub has_more: bool,
}

/// The contract the monitoring engine consumes upstream data through.
/// `RateLimitedFetcher` is the production implementation; tests substitute a fake.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn get_positions(&self, address: &WalletAddress, exchange: Exchange) -> Result<Vec<Position>>;
    async fn get_mark_prices(&self, exchange: Exchange) -> Result<HashMap<String, Decimal>>;
    async fn get_cohort_page(&self, cohort_id: &str, offset: u32, limit: u32) -> Result<CohortPage>;
}

pub struct RateLimitedFetcher {
    http: reqwest::Client,
    info_url: String,
    graphql_url: String,
    gate: AdmissionGate,
    config: FetcherConfig,
}

impl RateLimitedFetcher {
    pub fn new(info_url: impl Into<String>, graphql_url: impl Into<String>, config: FetcherConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            info_url: info_url.into(),
            graphql_url: graphql_url.into(),
            gate: AdmissionGate::new(config),
            config,
        }
    }

    /// Serializes `op` behind the admission gate, retrying transient
    /// failures with exponential backoff and full jitter.
    async fn call_with_backoff<T, F, Fut>(&self, pacing_key: Option<(&WalletAddress, &'static str)>, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let _permit = self.gate.admit(pacing_key).await;
            let timeout = Duration::from_millis(self.config.request_timeout_ms);
            let result = tokio::time::timeout(timeout, op()).await;
            match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(FetcherError::MalformedResponse(msg))) => {
                    return Err(FetcherError::MalformedResponse(msg));
                }
                Ok(Err(FetcherError::TransientUpstream(msg))) => {
                    if attempt >= self.config.backoff_max_attempts {
                        return Err(FetcherError::TransientUpstream(msg));
                    }
                    backoff_sleep(attempt, &self.config).await;
                    attempt += 1;
                }
                Err(_elapsed) => {
                    if attempt >= self.config.backoff_max_attempts {
                        return Err(FetcherError::TransientUpstream("request timed out".into()));
                    }
                    warn!("request timed out, retrying");
                    backoff_sleep(attempt, &self.config).await;
                    attempt += 1;
                }
            }
        }
    }

    fn parse_position(address: &WalletAddress, exchange: Exchange, entry: AssetPositionEntry) -> Result<Position> {
        let data = entry.position;
        let szi: Decimal = data
            .szi
            .parse()
            .map_err(|e| FetcherError::MalformedResponse(format!("szi: {e}")))?;
        let side = Side::from_signed_size(szi);
        let entry_price: Decimal = data
            .entry_px
            .as_deref()
            .unwrap_or("0")
            .parse()
            .map_err(|e| FetcherError::MalformedResponse(format!("entryPx: {e}")))?;
        let liquidation_price = match data.liquidation_px.as_deref() {
            Some(s) => Some(
                s.parse::<Decimal>()
                    .map_err(|e| FetcherError::MalformedResponse(format!("liquidationPx: {e}")))?,
            ),
            None => None,
        };
        let notional: Decimal = data
            .position_value
            .as_deref()
            .unwrap_or("0")
            .parse()
            .unwrap_or(Decimal::ZERO);
        let leverage = data
            .leverage
            .as_ref()
            .and_then(|l| l.value)
            .map(Decimal::from)
            .unwrap_or(Decimal::ONE);
        let margin_type = match data.leverage.as_ref().and_then(|l| l.leverage_type.as_deref()) {
            Some("isolated") => MarginType::Isolated,
            _ => MarginType::Cross,
        };

        Ok(Position {
            key: PositionKey::new(*address, data.coin, exchange, side),
            size: szi.into(),
            entry_price: entry_price.into(),
            mark_price: entry_price.into(), // refined by a mark-price merge upstream of caching
            liquidation_price: liquidation_price.map(Into::into),
            notional,
            leverage,
            margin_type,
            last_updated: Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeApi for RateLimitedFetcher {
    async fn get_positions(&self, address: &WalletAddress, exchange: Exchange) -> Result<Vec<Position>> {
        let address_str = address.to_string();
        let dex_tag = exchange.dex_tag();
        let response = self
            .call_with_backoff(Some((address, dex_tag)), || async {
                let body = ClearinghouseStateRequest {
                    kind: "clearinghouseState",
                    user: &address_str,
                    dex: dex_tag,
                };
                let resp = self
                    .http
                    .post(&self.info_url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| FetcherError::TransientUpstream(e.to_string()))?;
                if resp.status().as_u16() == 429 || resp.status().is_server_error() {
                    return Err(FetcherError::TransientUpstream(format!("status {}", resp.status())));
                }
                resp.json::<ClearinghouseStateResponse>()
                    .await
                    .map_err(|e| FetcherError::MalformedResponse(e.to_string()))
            })
            .await?;

        debug!(address = %address, exchange = %exchange, count = response.asset_positions.len(), "fetched positions");

        // A position with no liquidation price is still returned here; the
        // cache treats that as a silent eviction rather than a liquidation.
        response
            .asset_positions
            .into_iter()
            .map(|entry| Self::parse_position(address, exchange, entry))
            .collect()
    }

    async fn get_mark_prices(&self, exchange: Exchange) -> Result<HashMap<String, Decimal>> {
        let dex_tag = exchange.dex_tag();
        let raw = self
            .call_with_backoff(None, || async {
                let body = AllMidsRequest {
                    kind: "allMids",
                    dex: dex_tag,
                };
                let resp = self
                    .http
                    .post(&self.info_url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| FetcherError::TransientUpstream(e.to_string()))?;
                if resp.status().as_u16() == 429 || resp.status().is_server_error() {
                    return Err(FetcherError::TransientUpstream(format!("status {}", resp.status())));
                }
                resp.json::<AllMidsResponse>()
                    .await
                    .map_err(|e| FetcherError::MalformedResponse(e.to_string()))
            })
            .await?;

        raw.into_iter()
            .map(|(coin, px)| {
                Decimal::from_str(&px)
                    .map(|d| (coin, d))
                    .map_err(|e| FetcherError::MalformedResponse(format!("mark price {px}: {e}")))
            })
            .collect()
    }

    async fn get_cohort_page(&self, cohort_id: &str, offset: u32, limit: u32) -> Result<CohortPage> {
        let response = self
            .call_with_backoff(None, || async {
                let body = CohortQueryRequest {
                    query: COHORT_QUERY,
                    variables: CohortQueryVariables {
                        id: cohort_id,
                        limit,
                        offset,
                    },
                };
                let resp = self
                    .http
                    .post(&self.graphql_url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| FetcherError::TransientUpstream(e.to_string()))?;
                if resp.status().as_u16() == 429 || resp.status().is_server_error() {
                    return Err(FetcherError::TransientUpstream(format!("status {}", resp.status())));
                }
                resp.json::<CohortQueryResponse>()
                    .await
                    .map_err(|e| FetcherError::MalformedResponse(e.to_string()))
            })
            .await?;

        Ok(CohortPage {
            traders: response.data.traders,
            has_more: response.data.has_more,
        })
    }
}

//! Upstream JSON wire shapes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct ClearinghouseStateRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user: &'a str,
    pub dex: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ClearinghouseStateResponse {
    #[serde(rename = "assetPositions", default)]
    pub asset_positions: Vec<AssetPositionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AssetPositionEntry {
    pub position: AssetPositionData,
}

#[derive(Debug, Deserialize)]
pub struct AssetPositionData {
    pub coin: String,
    pub szi: String,
    #[serde(rename = "entryPx")]
    pub entry_px: Option<String>,
    #[serde(rename = "liquidationPx")]
    pub liquidation_px: Option<String>,
    #[serde(rename = "positionValue")]
    pub position_value: Option<String>,
    pub leverage: Option<LeverageInfo>,
    #[serde(rename = "marginUsed")]
    pub margin_used: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeverageInfo {
    #[serde(rename = "type")]
    pub leverage_type: Option<String>,
    pub value: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AllMidsRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub dex: &'a str,
}

pub type AllMidsResponse = HashMap<String, String>;

#[derive(Debug, Serialize)]
pub struct CohortQueryRequest<'a> {
    pub query: &'static str,
    pub variables: CohortQueryVariables<'a>,
}

#[derive(Debug, Serialize)]
pub struct CohortQueryVariables<'a> {
    pub id: &'a str,
    pub limit: u32,
    pub offset: u32,
}

pub const COHORT_QUERY: &str = "query GetSizeCohort($id: String!, $limit: Int!, $offset: Int!) { \
    traders: getSizeCohort(id: $id, limit: $limit, offset: $offset) { \
        address accountValue totalNotional leverage isLong } hasMore }";

#[derive(Debug, Deserialize)]
pub struct CohortQueryResponse {
    pub data: CohortQueryData,
}

#[derive(Debug, Deserialize)]
pub struct CohortQueryData {
    pub traders: Vec<CohortTrader>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CohortTrader {
    pub address: String,
    #[serde(rename = "accountValue")]
    pub account_value: String,
    #[serde(rename = "totalNotional")]
    pub total_notional: String,
    pub leverage: Option<f64>,
    #[serde(rename = "isLong")]
    pub is_long: Option<bool>,
}

//! Wire types for the Hyperliquid info endpoint
//!
//! The info API reports most decimals as strings. Every numeric field here is
//! read leniently: a string or a number parses, anything else (missing, null,
//! garbage) reads as absent and the caller decides the fallback.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Request bodies posted to the info endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InfoRequest {
    #[serde(rename = "clearinghouseState")]
    ClearinghouseState {
        user: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        dex: Option<String>,
    },
    Referral {
        user: String,
    },
    AllMids {
        #[serde(skip_serializing_if = "Option::is_none")]
        dex: Option<String>,
    },
}

/// Read a JSON value as f64 when it is a number or a numeric string
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Serde adapter for string-or-number decimals
pub fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64))
}

/// Serde adapter for epoch timestamps that may arrive as strings
pub fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Serde adapter for labels; a non-string value reads as absent
pub fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_leverage<'de, D>(deserializer: D) -> std::result::Result<Option<Leverage>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value::<Leverage>(v).ok()))
}

/// One account snapshot on one market
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    #[serde(default)]
    pub asset_positions: Vec<AssetPosition>,
    #[serde(default)]
    pub margin_summary: Option<MarginSummary>,
}

impl ClearinghouseState {
    /// Position payloads present in the snapshot, skipping empty slots
    pub fn positions(&self) -> impl Iterator<Item = &PositionData> {
        self.asset_positions.iter().filter_map(|p| p.position.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetPosition {
    #[serde(default)]
    pub position: Option<PositionData>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_string: Option<String>,
}

/// Raw position payload. `szi` is signed: negative means short.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub coin: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub szi: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_px: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub position_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub unrealized_pnl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub liquidation_px: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub margin_used: Option<f64>,
    #[serde(default, deserialize_with = "lenient_leverage")]
    pub leverage: Option<Leverage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leverage {
    /// "cross" or "isolated"
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub type_string: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummary {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub account_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_margin_used: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_ntl_pos: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_raw_usd: Option<f64>,
}

/// Response of the `referral` info request for a builder address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralResponse {
    #[serde(default)]
    pub referrer_state: Option<ReferrerState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferrerState {
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub data: Option<ReferrerData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerData {
    #[serde(default)]
    pub n_referrals: Option<u64>,
    #[serde(default)]
    pub referral_states: Vec<ReferralState>,
}

/// One referred user as reported by the referral endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralState {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cum_vlm: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cum_rewarded_fees_since_referred: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub time_joined: Option<i64>,
}

/// `allMids` response: coin -> mid price
pub type AllMids = HashMap<String, String>;

/// Parse an `allMids` response, dropping entries whose price does not parse
pub fn parse_mids(mids: &AllMids) -> HashMap<String, f64> {
    mids.iter()
        .filter_map(|(coin, px)| px.trim().parse::<f64>().ok().map(|p| (coin.clone(), p)))
        .collect()
}

//! Hyperliquid info API access

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::HyperliquidClient;
pub use types::{
    AllMids, AssetPosition, ClearinghouseState, Leverage, MarginSummary, PositionData,
    ReferralResponse,
};

/// Anything that can return an account snapshot for one market
///
/// `dex` of `None` selects the core perpetuals market; `Some(name)` selects a
/// HIP-3 builder-deployed DEX.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, address: &str, dex: Option<&str>) -> Result<ClearinghouseState>;
}

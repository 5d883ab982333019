//! Concurrent snapshot fetching
//!
//! One request chain per trader, at most `workers` in flight. All results are
//! collected before anything downstream runs. A failed trader keeps its slot
//! and carries the error instead of positions.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::TraderSnapshot;
use crate::api::SnapshotSource;
use crate::error::Error;

/// Error message recorded on a trader whose fetch failed
fn fetch_error(address: &str, market: &str, e: Error) -> String {
    Error::SnapshotFetch {
        address: address.to_string(),
        reason: format!("{}: {}", market, e),
    }
    .to_string()
}

/// Which markets to query for each trader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSelection {
    #[serde(rename = "hypercore")]
    HyperCore,
    Hip3,
    #[default]
    Both,
}

impl MarketSelection {
    pub fn includes_hypercore(&self) -> bool {
        matches!(self, MarketSelection::HyperCore | MarketSelection::Both)
    }

    pub fn includes_hip3(&self) -> bool {
        matches!(self, MarketSelection::Hip3 | MarketSelection::Both)
    }
}

impl FromStr for MarketSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hypercore" | "core" => Ok(MarketSelection::HyperCore),
            "hip3" | "hip-3" => Ok(MarketSelection::Hip3),
            "both" | "all" => Ok(MarketSelection::Both),
            other => Err(format!(
                "unknown market '{}' (expected hypercore, hip3 or both)",
                other
            )),
        }
    }
}

impl fmt::Display for MarketSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketSelection::HyperCore => write!(f, "hypercore"),
            MarketSelection::Hip3 => write!(f, "hip3"),
            MarketSelection::Both => write!(f, "both"),
        }
    }
}

/// Fetches raw snapshots for many traders through a [`SnapshotSource`]
pub struct PositionFetcher<S: SnapshotSource> {
    source: Arc<S>,
    workers: usize,
    hip3_dex: String,
    market: MarketSelection,
}

impl<S: SnapshotSource> PositionFetcher<S> {
    pub fn new(source: Arc<S>, workers: usize, hip3_dex: &str, market: MarketSelection) -> Self {
        Self {
            source,
            workers: workers.max(1),
            hip3_dex: hip3_dex.to_string(),
            market,
        }
    }

    /// Fetch the selected markets for one trader.
    ///
    /// The first failing request ends the chain; markets fetched before it
    /// are kept.
    pub async fn fetch_one(&self, address: &str) -> TraderSnapshot {
        let mut snapshot = TraderSnapshot {
            address: address.to_string(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        };

        if self.market.includes_hypercore() {
            match self.source.fetch(address, None).await {
                Ok(state) => snapshot.hypercore = Some(state),
                Err(e) => {
                    warn!("HyperCore fetch failed for {}: {}", address, e);
                    snapshot.error = Some(fetch_error(address, "HyperCore", e));
                    return snapshot;
                }
            }
        }

        if self.market.includes_hip3() {
            match self.source.fetch(address, Some(&self.hip3_dex)).await {
                Ok(state) => snapshot.hip3 = Some(state),
                Err(e) => {
                    warn!("HIP-3 ({}) fetch failed for {}: {}", self.hip3_dex, address, e);
                    snapshot.error = Some(fetch_error(address, "HIP-3", e));
                }
            }
        }

        snapshot
    }

    /// Fetch every trader; output order matches `addresses`
    pub async fn fetch_all(&self, addresses: &[String]) -> Vec<TraderSnapshot> {
        let total = addresses.len();
        info!(
            "Fetching {} traders ({} markets, {} workers)",
            total, self.market, self.workers
        );

        let mut results: Vec<(usize, TraderSnapshot)> = stream::iter(addresses.iter().enumerate())
            .map(|(idx, address)| async move { (idx, self.fetch_one(address).await) })
            .buffer_unordered(self.workers)
            .inspect(|(idx, snapshot)| {
                debug!("Fetched {} ({})", snapshot.address, idx + 1);
            })
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);
        let snapshots: Vec<TraderSnapshot> = results.into_iter().map(|(_, s)| s).collect();

        let failed = snapshots.iter().filter(|s| s.error.is_some()).count();
        info!("Fetched {} traders, {} failed", total, failed);

        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClearinghouseState;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source: fails for addresses starting with "0xbad"
    #[derive(Default)]
    struct MockSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotSource for MockSource {
        async fn fetch(&self, address: &str, dex: Option<&str>) -> Result<ClearinghouseState> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.starts_with("0xbad") {
                return Err(Error::HttpStatus { status: 500 });
            }
            let coin = match dex {
                Some(dex) => format!("{}:TEST", dex),
                None => "BTC".to_string(),
            };
            let raw = format!(
                r#"{{"assetPositions": [{{"position": {{"coin": "{}", "szi": "1", "positionValue": "10"}}}}]}}"#,
                coin
            );
            Ok(serde_json::from_str(&raw)?)
        }
    }

    fn addresses(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_market_selection_parse() {
        assert_eq!("both".parse::<MarketSelection>(), Ok(MarketSelection::Both));
        assert_eq!("HIP3".parse::<MarketSelection>(), Ok(MarketSelection::Hip3));
        assert_eq!(
            "hypercore".parse::<MarketSelection>(),
            Ok(MarketSelection::HyperCore)
        );
        assert!("spot".parse::<MarketSelection>().is_err());
        assert_eq!(serde_json::to_value(MarketSelection::HyperCore).unwrap(), "hypercore");
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order_and_degrades_failures() {
        let source = Arc::new(MockSource::default());
        let fetcher = PositionFetcher::new(source.clone(), 3, "xyz", MarketSelection::Both);

        let input = addresses(&["0xa", "0xbad1", "0xc", "0xd"]);
        let snapshots = fetcher.fetch_all(&input).await;

        assert_eq!(snapshots.len(), 4);
        let order: Vec<&str> = snapshots.iter().map(|s| s.address.as_str()).collect();
        assert_eq!(order, vec!["0xa", "0xbad1", "0xc", "0xd"]);

        let bad = &snapshots[1];
        assert_eq!(
            bad.error.as_deref(),
            Some("Snapshot fetch failed for 0xbad1: HyperCore: Info API returned status 500")
        );
        assert!(bad.hypercore.is_none());
        assert!(bad.hip3.is_none());

        let good = &snapshots[0];
        assert!(good.error.is_none());
        assert!(good.hypercore.is_some());
        assert!(good.hip3.is_some());

        // Failed trader stops after the first request
        assert_eq!(source.calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_single_market_selection() {
        let source = Arc::new(MockSource::default());
        let fetcher = PositionFetcher::new(source.clone(), 0, "xyz", MarketSelection::Hip3);

        let snapshot = fetcher.fetch_one("0xa").await;
        assert!(snapshot.hypercore.is_none());
        let hip3 = snapshot.hip3.unwrap();
        assert_eq!(hip3.positions().next().unwrap().coin.as_deref(), Some("xyz:TEST"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}

//! Position rollups
//!
//! One accumulator type serves every grouping (coin, category, performance
//! tier). Buckets accumulate unrounded values; rounding happens only when a
//! bucket is turned into a [`BucketSummary`] for output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::math::{round2, round4, safe_ratio};
use crate::position::{Direction, Position, RiskLevel, TraderPositions};

impl AsRef<Position> for Position {
    fn as_ref(&self) -> &Position {
        self
    }
}

/// A position together with the trader holding it
#[derive(Debug, Clone, Copy)]
pub struct HeldPosition<'a> {
    pub owner: &'a TraderPositions,
    pub position: &'a Position,
}

impl AsRef<Position> for HeldPosition<'_> {
    fn as_ref(&self) -> &Position {
        self.position
    }
}

/// Every position across traders, in trader then position order
pub fn held_positions(traders: &[TraderPositions]) -> Vec<HeldPosition<'_>> {
    traders
        .iter()
        .flat_map(|owner| {
            owner
                .positions
                .iter()
                .map(move |position| HeldPosition { owner, position })
        })
        .collect()
}

/// Running totals for one group of positions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationBucket {
    pub count: usize,
    pub total_value: f64,
    pub longs: usize,
    pub shorts: usize,
    pub long_value: f64,
    pub short_value: f64,
    pub longs_total_size: f64,
    pub shorts_total_size: f64,
    pub longs_unrealized_pnl: f64,
    pub shorts_unrealized_pnl: f64,
    pub total_unrealized_pnl: f64,
    pub total_margin_used: f64,
}

impl AggregationBucket {
    pub fn add(&mut self, position: &Position) {
        self.count += 1;
        self.total_value += position.position_value;
        self.total_unrealized_pnl += position.unrealized_pnl;
        self.total_margin_used += position.margin_used;

        match position.direction {
            Direction::Long => {
                self.longs += 1;
                self.long_value += position.position_value;
                self.longs_total_size += position.size;
                self.longs_unrealized_pnl += position.unrealized_pnl;
            }
            Direction::Short => {
                self.shorts += 1;
                self.short_value += position.position_value;
                self.shorts_total_size += position.size;
                self.shorts_unrealized_pnl += position.unrealized_pnl;
            }
        }
    }

    /// Count-based long/short ratio
    pub fn long_short_ratio(&self) -> f64 {
        safe_ratio(self.longs as f64, self.shorts as f64)
    }

    /// Size-based long/short ratio
    pub fn long_short_size_ratio(&self) -> f64 {
        safe_ratio(self.longs_total_size, self.shorts_total_size)
    }

    /// Rounded view for output
    pub fn summary(&self) -> BucketSummary {
        BucketSummary {
            count: self.count,
            total_value: round2(self.total_value),
            longs: self.longs,
            shorts: self.shorts,
            long_short_ratio: round2(self.long_short_ratio()),
            long_value: round2(self.long_value),
            short_value: round2(self.short_value),
            longs_total_size: round4(self.longs_total_size),
            shorts_total_size: round4(self.shorts_total_size),
            long_short_size_ratio: round2(self.long_short_size_ratio()),
            longs_unrealized_pnl: round2(self.longs_unrealized_pnl),
            shorts_unrealized_pnl: round2(self.shorts_unrealized_pnl),
            total_unrealized_pnl: round2(self.total_unrealized_pnl),
            total_margin_used: round2(self.total_margin_used),
        }
    }
}

/// Rounded bucket as written to reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub count: usize,
    pub total_value: f64,
    pub longs: usize,
    pub shorts: usize,
    pub long_short_ratio: f64,
    pub long_value: f64,
    pub short_value: f64,
    pub longs_total_size: f64,
    pub shorts_total_size: f64,
    pub long_short_size_ratio: f64,
    pub longs_unrealized_pnl: f64,
    pub shorts_unrealized_pnl: f64,
    pub total_unrealized_pnl: f64,
    pub total_margin_used: f64,
}

/// Group positions by an arbitrary key. Keys come out in ascending order.
pub fn aggregate<T, K, F>(positions: &[T], mut key_fn: F) -> BTreeMap<K, AggregationBucket>
where
    T: AsRef<Position>,
    K: Ord,
    F: FnMut(&T) -> K,
{
    let mut buckets: BTreeMap<K, AggregationBucket> = BTreeMap::new();
    for item in positions {
        buckets
            .entry(key_fn(item))
            .or_default()
            .add(item.as_ref());
    }
    buckets
}

/// Rollup by coin, largest total value first. Ties keep coin-name order.
pub fn by_coin<T: AsRef<Position>>(positions: &[T]) -> Vec<(String, AggregationBucket)> {
    let mut coins: Vec<(String, AggregationBucket)> =
        aggregate(positions, |p| p.as_ref().coin.clone())
            .into_iter()
            .collect();
    coins.sort_by(|a, b| b.1.total_value.total_cmp(&a.1.total_value));
    coins
}

/// Rollup by the holder's category, in category-name order
pub fn by_category<'a>(positions: &[HeldPosition<'a>]) -> BTreeMap<String, AggregationBucket> {
    aggregate(positions, |held| category_of(held.owner))
}

/// Category label of a trader; blank or missing reads as "Unknown"
pub fn category_of(trader: &TraderPositions) -> String {
    trader
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

/// Largest `n` items by absolute position value; ties keep input order
pub fn top_positions<T: AsRef<Position> + Clone>(positions: &[T], n: usize) -> Vec<T> {
    let mut sorted = positions.to_vec();
    sorted.sort_by(|a, b| {
        b.as_ref()
            .position_value
            .abs()
            .total_cmp(&a.as_ref().position_value.abs())
    });
    sorted.truncate(n);
    sorted
}

/// Number of positions per risk tier; tiers with no positions are omitted
pub fn risk_distribution<T: AsRef<Position>>(positions: &[T]) -> BTreeMap<RiskLevel, usize> {
    let mut counts = BTreeMap::new();
    for p in positions {
        *counts.entry(p.as_ref().risk_level).or_default() += 1;
    }
    counts
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::Leverage;
    use crate::position::MarketType;

    pub(crate) fn position(coin: &str, direction: Direction, size: f64, value: f64) -> Position {
        Position {
            coin: coin.into(),
            market_type: MarketType::HyperCore,
            direction,
            size,
            entry_price: 0.0,
            liquidation_price: None,
            position_value: value,
            unrealized_pnl: 1.0,
            pnl_percent: 0.0,
            leverage: Leverage::default(),
            margin_used: 0.5,
            distance_to_liq_pct: None,
            distance_to_liq_usd: None,
            risk_level: RiskLevel::Unknown,
        }
    }

    fn bucket(longs: usize, shorts: usize) -> AggregationBucket {
        AggregationBucket {
            longs,
            shorts,
            ..Default::default()
        }
    }

    #[test]
    fn test_ratio_zero_guard() {
        assert_eq!(bucket(5, 0).long_short_ratio(), 5.0);
        assert_eq!(bucket(0, 0).long_short_ratio(), 0.0);
        assert_eq!(bucket(3, 6).long_short_ratio(), 0.5);
        assert_eq!(bucket(0, 4).long_short_ratio(), 0.0);
    }

    #[test]
    fn test_aggregate_by_coin_is_value_ranked() {
        let positions = vec![
            position("ETH", Direction::Long, 1.0, 100.0),
            position("BTC", Direction::Short, 2.0, 500.0),
            position("ETH", Direction::Short, 3.0, 50.0),
            position("BTC", Direction::Long, 1.0, 300.0),
            position("SOL", Direction::Long, 10.0, 10.0),
        ];
        let coins = by_coin(&positions);
        let order: Vec<&str> = coins.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(order, vec!["BTC", "ETH", "SOL"]);

        let btc = &coins[0].1;
        assert_eq!(btc.count, 2);
        assert_eq!(btc.total_value, 800.0);
        assert_eq!(btc.longs, 1);
        assert_eq!(btc.shorts, 1);
        assert_eq!(btc.long_short_size_ratio(), 0.5);
        assert_eq!(btc.total_unrealized_pnl, 2.0);
        assert_eq!(btc.total_margin_used, 1.0);

        let sol = coins[2].1.summary();
        assert_eq!(sol.long_short_ratio, 1.0);
        assert_eq!(sol.long_short_size_ratio, 10.0);
    }

    #[test]
    fn test_by_category_is_alphabetical() {
        let traders = vec![
            TraderPositions {
                address: "0xa".into(),
                category: Some("Whales".into()),
                positions: vec![position("BTC", Direction::Long, 1.0, 1000.0)],
                ..Default::default()
            },
            TraderPositions {
                address: "0xb".into(),
                category: Some("Degens".into()),
                positions: vec![
                    position("BTC", Direction::Short, 1.0, 10.0),
                    position("ETH", Direction::Short, 1.0, 10.0),
                ],
                ..Default::default()
            },
            TraderPositions {
                address: "0xc".into(),
                category: Some("  ".into()),
                positions: vec![position("BTC", Direction::Long, 1.0, 5.0)],
                ..Default::default()
            },
        ];
        let held = held_positions(&traders);
        assert_eq!(held.len(), 4);

        let categories = by_category(&held);
        let keys: Vec<&str> = categories.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Degens", "Unknown", "Whales"]);
        assert_eq!(categories["Degens"].shorts, 2);
        assert_eq!(categories["Degens"].long_short_ratio(), 0.0);
    }

    #[test]
    fn test_top_positions_stable() {
        let positions = vec![
            position("A", Direction::Long, 1.0, 10.0),
            position("B", Direction::Short, 1.0, -30.0),
            position("C", Direction::Long, 1.0, 10.0),
            position("D", Direction::Long, 1.0, 20.0),
        ];
        let top = top_positions(&positions, 3);
        let coins: Vec<&str> = top.iter().map(|p| p.coin.as_str()).collect();
        assert_eq!(coins, vec!["B", "D", "A"]);
    }

    #[test]
    fn test_rounding_applies_only_to_summary() {
        let positions: Vec<Position> = (0..3)
            .map(|_| position("BTC", Direction::Long, 0.333_33, 0.004))
            .collect();
        let buckets = aggregate(&positions, |p| p.coin.clone());
        let btc = &buckets["BTC"];
        // Accumulated unrounded: 0.012 -> 0.01, not 3 x round(0.004) = 0
        assert_eq!(btc.summary().total_value, 0.01);
        assert_eq!(btc.summary().longs_total_size, 1.0);
    }

    #[test]
    fn test_risk_distribution() {
        let mut positions = vec![
            position("A", Direction::Long, 1.0, 1.0),
            position("B", Direction::Long, 1.0, 1.0),
        ];
        positions[0].risk_level = RiskLevel::High;
        let dist = risk_distribution(&positions);
        assert_eq!(dist.get(&RiskLevel::High), Some(&1));
        assert_eq!(dist.get(&RiskLevel::Unknown), Some(&1));
        assert_eq!(dist.get(&RiskLevel::Low), None);
    }
}

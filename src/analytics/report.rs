//! Report builders over processed positions
//!
//! Every report here is a pure function of its inputs plus a generation
//! timestamp. Numbers are rounded only in the report structs.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use super::aggregate::{
    aggregate, by_category, by_coin, category_of, held_positions, risk_distribution, top_positions,
    BucketSummary, HeldPosition,
};
use super::tier::{classify_tier, PerformanceTier, TierConfig};
use super::trader_list::TraderProfile;
use crate::identity::address;
use crate::math::{round2, round4, safe_ratio};
use crate::position::{Direction, Position, PositionsFile, RiskLevel, TraderPositions};

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// A position row carrying its owner
#[derive(Debug, Clone, Serialize)]
pub struct PositionRow {
    pub address: String,
    pub account_value: f64,
    #[serde(flatten)]
    pub position: Position,
}

impl From<HeldPosition<'_>> for PositionRow {
    fn from(held: HeldPosition<'_>) -> Self {
        Self {
            address: held.owner.address.clone(),
            account_value: round2(held.owner.account_summary.account_value),
            position: held.position.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BuilderTotals {
    pub total_users: usize,
    pub users_with_positions: usize,
    pub users_without_positions: usize,
    pub total_positions: usize,
    pub total_position_value: f64,
    pub avg_positions_per_user: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoinRollup {
    pub coin: String,
    #[serde(flatten)]
    pub stats: BucketSummary,
}

/// Compact row in the top-positions list
#[derive(Debug, Clone, Serialize)]
pub struct TopPosition {
    pub user_address: String,
    pub coin: String,
    pub direction: Direction,
    pub size: f64,
    pub position_value: f64,
    pub unrealized_pnl: f64,
    pub entry_price: f64,
    pub risk_level: RiskLevel,
    pub margin_used: f64,
}

impl From<HeldPosition<'_>> for TopPosition {
    fn from(held: HeldPosition<'_>) -> Self {
        let p = held.position;
        Self {
            user_address: held.owner.address.clone(),
            coin: p.coin.clone(),
            direction: p.direction,
            size: round4(p.size),
            position_value: round2(p.position_value),
            unrealized_pnl: round2(p.unrealized_pnl),
            entry_price: round2(p.entry_price),
            risk_level: p.risk_level,
            margin_used: round2(p.margin_used),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuilderSummary {
    pub generated_at: String,
    pub builder: Option<String>,
    pub fetch_date: Option<String>,
    pub fetched_at: String,
    pub summary: BuilderTotals,
    pub by_coin: Vec<CoinRollup>,
    pub risk_distribution: BTreeMap<RiskLevel, usize>,
    pub top_positions: Vec<TopPosition>,
}

/// Totals, coin rollup, risk distribution and top positions for one fetch run
pub fn builder_summary(file: &PositionsFile, top_n: usize) -> BuilderSummary {
    let users = &file.users;
    let held = held_positions(users);

    let total_users = users.len();
    let users_with_positions = users.iter().filter(|u| u.has_positions).count();
    let total_positions: usize = users.iter().map(|u| u.num_positions).sum();

    let coins = by_coin(&held);
    let total_position_value: f64 = coins.iter().map(|(_, b)| b.total_value).sum();

    BuilderSummary {
        generated_at: now(),
        builder: file.builder.clone(),
        fetch_date: file.fetch_date.clone(),
        fetched_at: file.fetched_at.clone(),
        summary: BuilderTotals {
            total_users,
            users_with_positions,
            users_without_positions: total_users - users_with_positions,
            total_positions,
            total_position_value: round2(total_position_value),
            avg_positions_per_user: round2(safe_ratio(
                total_positions as f64,
                users_with_positions as f64,
            )),
        },
        by_coin: coins
            .into_iter()
            .map(|(coin, bucket)| CoinRollup {
                coin,
                stats: bucket.summary(),
            })
            .collect(),
        risk_distribution: risk_distribution(&held),
        top_positions: top_positions(&held, top_n)
            .into_iter()
            .map(TopPosition::from)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Category sentiment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CoinSentiment {
    pub longs: usize,
    pub shorts: usize,
    pub long_value: f64,
    pub short_value: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryRollup {
    pub traders: usize,
    pub traders_with_positions: usize,
    pub total_positions: usize,
    pub longs: usize,
    pub shorts: usize,
    pub long_short_ratio: f64,
    pub total_long_value: f64,
    pub total_short_value: f64,
    pub by_coin: BTreeMap<String, CoinSentiment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionLine {
    pub coin: String,
    pub direction: Direction,
    pub size: f64,
    pub position_value: f64,
    pub unrealized_pnl: f64,
    pub entry_price: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryTrader {
    pub name: String,
    pub address: String,
    pub category: String,
    pub has_positions: bool,
    pub num_positions: usize,
    pub account_value: f64,
    pub positions: Vec<PositionLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub generated_at: String,
    pub source_file: Option<String>,
    pub total_traders: usize,
    pub traders_with_positions: usize,
    pub by_category: BTreeMap<String, CategoryRollup>,
    pub traders: Vec<CategoryTrader>,
}

/// Long/short sentiment per trader category
pub fn category_summary(traders: &[TraderPositions], source_file: Option<&str>) -> CategorySummary {
    let held = held_positions(traders);
    let mut rollups: BTreeMap<String, CategoryRollup> = BTreeMap::new();

    for trader in traders {
        let rollup = rollups.entry(category_of(trader)).or_default();
        rollup.traders += 1;
        if trader.has_positions {
            rollup.traders_with_positions += 1;
            rollup.total_positions += trader.num_positions;
        }
    }

    for (category, bucket) in by_category(&held) {
        let rollup = rollups.entry(category).or_default();
        rollup.longs = bucket.longs;
        rollup.shorts = bucket.shorts;
        rollup.long_short_ratio = round2(bucket.long_short_ratio());
        rollup.total_long_value = round2(bucket.long_value);
        rollup.total_short_value = round2(bucket.short_value);
    }

    let per_coin = aggregate(&held, |h| (category_of(h.owner), h.position.coin.clone()));
    for ((category, coin), bucket) in per_coin {
        rollups.entry(category).or_default().by_coin.insert(
            coin,
            CoinSentiment {
                longs: bucket.longs,
                shorts: bucket.shorts,
                long_value: round2(bucket.long_value),
                short_value: round2(bucket.short_value),
                ratio: round2(bucket.long_short_ratio()),
            },
        );
    }

    let mut rows: Vec<CategoryTrader> = traders
        .iter()
        .map(|t| CategoryTrader {
            name: t.name.clone().unwrap_or_default(),
            address: t.address.clone(),
            category: category_of(t),
            has_positions: t.has_positions,
            num_positions: t.num_positions,
            account_value: t.account_summary.account_value,
            positions: t
                .positions
                .iter()
                .map(|p| PositionLine {
                    coin: p.coin.clone(),
                    direction: p.direction,
                    size: p.size,
                    position_value: round2(p.position_value),
                    unrealized_pnl: round2(p.unrealized_pnl),
                    entry_price: p.entry_price,
                    risk_level: p.risk_level,
                })
                .collect(),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| b.account_value.total_cmp(&a.account_value))
    });

    CategorySummary {
        generated_at: now(),
        source_file: source_file.map(str::to_string),
        total_traders: rows.len(),
        traders_with_positions: rows.iter().filter(|t| t.has_positions).count(),
        by_category: rollups,
        traders: rows,
    }
}

// ---------------------------------------------------------------------------
// Trader tiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TierTrader {
    pub name: String,
    pub address: String,
    pub categories: Vec<String>,
    pub win_rate: Option<f64>,
    pub wins: Option<u32>,
    pub losses: Option<u32>,
    pub total_profit: Option<f64>,
    pub has_positions: bool,
    pub num_positions: usize,
    pub account_value: f64,
    pub unrealized_pnl: f64,
    pub top_coins: Vec<String>,
    pub performance_tier: PerformanceTier,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierTotals {
    pub total_traders: usize,
    pub traders_with_positions: usize,
    pub total_positions: usize,
    pub category_counts: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierSummary {
    pub generated_at: String,
    pub fetch_date: Option<String>,
    pub fetched_at: String,
    pub summary: TierTotals,
    pub traders: Vec<TierTrader>,
    pub by_performance_tier: BTreeMap<PerformanceTier, Vec<TierTrader>>,
    pub positions_by_tier: BTreeMap<PerformanceTier, BucketSummary>,
}

/// Profit descending, traders without a profit figure last
fn by_profit_desc(a: &TierTrader, b: &TierTrader) -> Ordering {
    match (a.total_profit, b.total_profit) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Coins of the largest positions by absolute value
fn top_coins(positions: &[Position], n: usize) -> Vec<String> {
    top_positions(positions, n)
        .into_iter()
        .map(|p| p.coin)
        .collect()
}

/// Join a trader list to processed positions and tier every trader.
///
/// Position records whose address is not in the list are skipped.
pub fn trader_tier_summary(
    profiles: &[TraderProfile],
    file: &PositionsFile,
    config: &TierConfig,
    top_coin_count: usize,
) -> TierSummary {
    let by_address: HashMap<String, &TraderProfile> =
        profiles.iter().map(|p| (p.key(), p)).collect();

    let mut traders = Vec::new();
    let mut tiers: HashMap<String, PerformanceTier> = HashMap::new();
    let mut category_counts: HashMap<String, usize> = HashMap::new();

    for user in &file.users {
        let key = address::canonical(&user.address);
        let Some(profile) = by_address.get(&key) else {
            warn!("Address {} not found in trader list", user.address);
            continue;
        };

        let tier = classify_tier(
            &profile.categories,
            profile.win_rate,
            profile.total_profit,
            config,
        );
        tiers.insert(key, tier);
        for category in &profile.categories {
            *category_counts.entry(category.clone()).or_default() += 1;
        }

        traders.push(TierTrader {
            name: profile.name.clone(),
            address: profile.address.clone(),
            categories: profile.categories.clone(),
            win_rate: profile.win_rate,
            wins: profile.wins,
            losses: profile.losses,
            total_profit: profile.total_profit,
            has_positions: user.has_positions,
            num_positions: user.num_positions,
            account_value: user.account_summary.account_value,
            unrealized_pnl: round2(user.positions.iter().map(|p| p.unrealized_pnl).sum()),
            top_coins: top_coins(&user.positions, top_coin_count),
            performance_tier: tier,
        });
    }

    traders.sort_by(by_profit_desc);

    let mut by_performance_tier: BTreeMap<PerformanceTier, Vec<TierTrader>> = PerformanceTier::ALL
        .iter()
        .map(|t| (*t, Vec::new()))
        .collect();
    for trader in &traders {
        by_performance_tier
            .entry(trader.performance_tier)
            .or_default()
            .push(trader.clone());
    }

    let held: Vec<HeldPosition<'_>> = held_positions(&file.users)
        .into_iter()
        .filter(|h| tiers.contains_key(&address::canonical(&h.owner.address)))
        .collect();
    let positions_by_tier = aggregate(&held, |h| {
        tiers
            .get(&address::canonical(&h.owner.address))
            .copied()
            .unwrap_or(PerformanceTier::Watch)
    })
    .into_iter()
    .map(|(tier, bucket)| (tier, bucket.summary()))
    .collect();

    let mut counts: Vec<CategoryCount> = category_counts
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));

    TierSummary {
        generated_at: now(),
        fetch_date: file.fetch_date.clone(),
        fetched_at: file.fetched_at.clone(),
        summary: TierTotals {
            total_traders: traders.len(),
            traders_with_positions: traders.iter().filter(|t| t.has_positions).count(),
            total_positions: traders.iter().map(|t| t.num_positions).sum(),
            category_counts: counts,
        },
        traders,
        by_performance_tier,
        positions_by_tier,
    }
}

// ---------------------------------------------------------------------------
// At-risk positions and coin book
// ---------------------------------------------------------------------------

/// Distance used for sorting when none is known
const UNKNOWN_DISTANCE_PCT: f64 = 100.0;

/// CRITICAL and HIGH positions, closest to liquidation first
pub fn at_risk_report(traders: &[TraderPositions]) -> Vec<PositionRow> {
    let mut rows: Vec<PositionRow> = held_positions(traders)
        .into_iter()
        .filter(|h| h.position.risk_level.is_at_risk())
        .map(PositionRow::from)
        .collect();
    rows.sort_by(|a, b| {
        let da = a.position.distance_to_liq_pct.unwrap_or(UNKNOWN_DISTANCE_PCT);
        let db = b.position.distance_to_liq_pct.unwrap_or(UNKNOWN_DISTANCE_PCT);
        da.total_cmp(&db)
    });
    rows
}

#[derive(Debug, Clone, Serialize)]
pub struct CoinBookSummary {
    pub total_longs: usize,
    pub total_shorts: usize,
    pub total_long_value: f64,
    pub total_short_value: f64,
    pub long_short_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoinBook {
    pub coin: String,
    pub longs: Vec<PositionRow>,
    pub shorts: Vec<PositionRow>,
    pub summary: CoinBookSummary,
}

/// All positions in one coin, split by side, largest value first
pub fn coin_book(traders: &[TraderPositions], coin: &str) -> CoinBook {
    let held: Vec<HeldPosition<'_>> = held_positions(traders)
        .into_iter()
        .filter(|h| h.position.coin.eq_ignore_ascii_case(coin))
        .collect();
    let bucket = aggregate(&held, |_| ()).remove(&()).unwrap_or_default();

    let side = |direction: Direction| -> Vec<PositionRow> {
        let mut rows: Vec<PositionRow> = held
            .iter()
            .filter(|h| h.position.direction == direction)
            .map(|h| PositionRow::from(*h))
            .collect();
        rows.sort_by(|a, b| {
            b.position
                .position_value
                .total_cmp(&a.position.position_value)
        });
        rows
    };

    CoinBook {
        coin: coin.to_string(),
        longs: side(Direction::Long),
        shorts: side(Direction::Short),
        summary: CoinBookSummary {
            total_longs: bucket.longs,
            total_shorts: bucket.shorts,
            total_long_value: round2(bucket.long_value),
            total_short_value: round2(bucket.short_value),
            long_short_ratio: round2(safe_ratio(bucket.longs as f64, bucket.shorts as f64)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::aggregate::tests::position;
    use crate::position::{AccountSummary, MarketSelection};

    fn trader(address: &str, category: &str, positions: Vec<Position>) -> TraderPositions {
        TraderPositions {
            address: address.into(),
            name: Some(format!("name-{}", address)),
            category: Some(category.into()),
            fetched_at: "2025-01-01T00:00:00Z".into(),
            has_positions: !positions.is_empty(),
            num_positions: positions.len(),
            account_summary: AccountSummary {
                account_value: 1000.0,
                ..Default::default()
            },
            positions,
            error: None,
        }
    }

    fn with_risk(mut p: Position, level: RiskLevel, pct: Option<f64>) -> Position {
        p.risk_level = level;
        p.distance_to_liq_pct = pct;
        p
    }

    fn sample_file() -> PositionsFile {
        PositionsFile::new(
            Some("basedapp"),
            MarketSelection::HyperCore,
            vec![
                trader(
                    "0xAAA",
                    "Whales",
                    vec![
                        position("BTC", Direction::Long, 1.0, 1000.0),
                        position("ETH", Direction::Short, 2.0, 200.0),
                    ],
                ),
                trader("0xbbb", "Degens", vec![position("BTC", Direction::Short, 0.5, 500.0)]),
                trader("0xccc", "Degens", vec![]),
            ],
        )
    }

    #[test]
    fn test_builder_summary() {
        let summary = builder_summary(&sample_file(), 2);
        assert_eq!(summary.summary.total_users, 3);
        assert_eq!(summary.summary.users_with_positions, 2);
        assert_eq!(summary.summary.users_without_positions, 1);
        assert_eq!(summary.summary.total_positions, 3);
        assert_eq!(summary.summary.total_position_value, 1700.0);
        assert_eq!(summary.summary.avg_positions_per_user, 1.5);

        assert_eq!(summary.by_coin[0].coin, "BTC");
        assert_eq!(summary.by_coin[0].stats.long_short_ratio, 1.0);
        assert_eq!(summary.top_positions.len(), 2);
        assert_eq!(summary.top_positions[0].position_value, 1000.0);
        assert_eq!(summary.risk_distribution.get(&RiskLevel::Unknown), Some(&3));
    }

    #[test]
    fn test_builder_summary_without_positions() {
        let file = PositionsFile::new(
            None,
            MarketSelection::Both,
            vec![trader("0xaaa", "X", vec![]), trader("0xbbb", "X", vec![])],
        );
        let summary = builder_summary(&file, 5);
        assert_eq!(summary.summary.users_with_positions, 0);
        assert_eq!(summary.summary.avg_positions_per_user, 0.0);
        assert_eq!(summary.summary.total_position_value, 0.0);
        assert!(summary.by_coin.is_empty());
        assert!(summary.top_positions.is_empty());
    }

    #[test]
    fn test_category_summary() {
        let file = sample_file();
        let summary = category_summary(&file.users, Some("traders.csv"));

        let keys: Vec<&str> = summary.by_category.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Degens", "Whales"]);

        let degens = &summary.by_category["Degens"];
        assert_eq!(degens.traders, 2);
        assert_eq!(degens.traders_with_positions, 1);
        assert_eq!(degens.shorts, 1);
        assert_eq!(degens.long_short_ratio, 0.0);
        assert_eq!(degens.by_coin["BTC"].short_value, 500.0);

        let whales = &summary.by_category["Whales"];
        assert_eq!(whales.long_short_ratio, 1.0);
        assert_eq!(whales.by_coin["BTC"].ratio, 1.0);

        assert_eq!(summary.traders[0].category, "Degens");
        assert_eq!(summary.traders[2].category, "Whales");
    }

    #[test]
    fn test_trader_tier_summary() {
        let profile = |address: &str, categories: &[&str], profit: Option<f64>| TraderProfile {
            name: address.to_string(),
            address: address.to_string(),
            category: categories.join(", "),
            categories: categories.iter().map(|s| s.to_string()).collect(),
            win_rate: Some(70.0),
            wins: None,
            losses: None,
            total_profit: profit,
        };
        let profiles = vec![
            profile("0xaaa", &["God Tier"], Some(100.0)),
            profile("0xBBB", &["Bad KOL", "God Tier"], Some(5000.0)),
        ];

        let summary = trader_tier_summary(&profiles, &sample_file(), &TierConfig::default(), 1);
        // 0xccc is not in the list
        assert_eq!(summary.traders.len(), 2);
        assert_eq!(summary.traders[0].address, "0xBBB");
        assert_eq!(summary.traders[0].performance_tier, PerformanceTier::Avoid);
        assert_eq!(summary.traders[1].performance_tier, PerformanceTier::Strong);
        assert_eq!(summary.traders[1].top_coins, vec!["BTC".to_string()]);
        assert_eq!(summary.traders[1].unrealized_pnl, 2.0);

        assert_eq!(summary.summary.category_counts[0].category, "God Tier");
        assert_eq!(summary.summary.category_counts[0].count, 2);
        assert!(summary.by_performance_tier[&PerformanceTier::Watch].is_empty());
        assert_eq!(summary.positions_by_tier[&PerformanceTier::Strong].count, 2);
        assert_eq!(summary.positions_by_tier[&PerformanceTier::Avoid].count, 1);
    }

    #[test]
    fn test_profit_sort_puts_missing_last() {
        let profiles = vec![
            TraderProfile {
                name: "a".into(),
                address: "0xaaa".into(),
                category: String::new(),
                categories: vec![],
                win_rate: None,
                wins: None,
                losses: None,
                total_profit: None,
            },
            TraderProfile {
                name: "b".into(),
                address: "0xbbb".into(),
                category: String::new(),
                categories: vec![],
                win_rate: None,
                wins: None,
                losses: None,
                total_profit: Some(-5.0),
            },
        ];
        let summary = trader_tier_summary(&profiles, &sample_file(), &TierConfig::default(), 3);
        assert_eq!(summary.traders[0].address, "0xbbb");
        assert_eq!(summary.traders[1].address, "0xaaa");
    }

    #[test]
    fn test_at_risk_report() {
        let traders = vec![
            trader(
                "0xa",
                "X",
                vec![
                    with_risk(position("BTC", Direction::Long, 1.0, 1.0), RiskLevel::High, Some(5.0)),
                    with_risk(position("ETH", Direction::Long, 1.0, 1.0), RiskLevel::Low, Some(50.0)),
                ],
            ),
            trader(
                "0xb",
                "X",
                vec![with_risk(
                    position("SOL", Direction::Short, 1.0, 1.0),
                    RiskLevel::Critical,
                    Some(1.2),
                )],
            ),
        ];
        let rows = at_risk_report(&traders);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].position.coin, "SOL");
        assert_eq!(rows[0].address, "0xb");
        assert_eq!(rows[1].position.coin, "BTC");

        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["risk_level"], "CRITICAL");
        assert_eq!(json["account_value"], 1000.0);
    }

    #[test]
    fn test_coin_book() {
        let traders = vec![
            trader(
                "0xa",
                "X",
                vec![
                    position("BTC", Direction::Long, 1.0, 100.0),
                    position("BTC", Direction::Long, 1.0, 300.0),
                ],
            ),
            trader("0xb", "X", vec![position("ETH", Direction::Short, 1.0, 50.0)]),
        ];
        let book = coin_book(&traders, "btc");
        assert_eq!(book.longs.len(), 2);
        assert!(book.shorts.is_empty());
        assert_eq!(book.longs[0].position.position_value, 300.0);
        assert_eq!(book.summary.total_long_value, 400.0);
        // No shorts: ratio is the long count
        assert_eq!(book.summary.long_short_ratio, 2.0);
    }
}

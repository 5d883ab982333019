//! Position analytics: aggregation, trader tiers and report builders

pub mod aggregate;
pub mod report;
pub mod tier;
pub mod trader_list;

pub use aggregate::{
    aggregate, by_category, by_coin, held_positions, risk_distribution, top_positions,
    AggregationBucket, BucketSummary, HeldPosition,
};
pub use report::{
    at_risk_report, builder_summary, category_summary, coin_book, trader_tier_summary,
    BuilderSummary, CategorySummary, CoinBook, PositionRow, TierSummary,
};
pub use tier::{classify_tier, PerformanceTier, TierConfig};
pub use trader_list::{load_trader_list, TraderProfile};

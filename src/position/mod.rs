//! Normalized positions and per-trader position records
//!
//! Raw account snapshots are fetched per trader ([`fetcher`]), normalized into
//! [`Position`]s ([`extractor`]) and tagged with a liquidation risk tier
//! ([`risk`]).

pub mod extractor;
pub mod fetcher;
pub mod risk;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::{ClearinghouseState, Leverage};

pub use extractor::{extract_positions, process_snapshot};
pub use fetcher::{MarketSelection, PositionFetcher};
pub use risk::{PriceCache, RiskAssessment, RiskClassifier};

/// Position side, derived from the sign of the signed size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Positive size is long; everything else, including exactly zero, is short
    pub fn from_signed_size(szi: f64) -> Self {
        if szi > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.pad("LONG"),
            Direction::Short => f.pad("SHORT"),
        }
    }
}

/// Market a position lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    #[serde(rename = "HyperCore")]
    HyperCore,
    #[serde(rename = "HIP-3")]
    Hip3,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::HyperCore => write!(f, "HyperCore"),
            MarketType::Hip3 => write!(f, "HIP-3"),
        }
    }
}

/// Liquidation risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Critical,
    High,
    Moderate,
    Low,
    Unknown,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::Critical,
        RiskLevel::High,
        RiskLevel::Moderate,
        RiskLevel::Low,
        RiskLevel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High => "HIGH",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::Low => "LOW",
            RiskLevel::Unknown => "UNKNOWN",
        }
    }

    /// Critical or high
    pub fn is_at_risk(&self) -> bool {
        matches!(self, RiskLevel::Critical | RiskLevel::High)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One open position for one trader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coin: String,
    pub market_type: MarketType,
    pub direction: Direction,
    /// Absolute size
    pub size: f64,
    pub entry_price: f64,
    pub liquidation_price: Option<f64>,
    pub position_value: f64,
    pub unrealized_pnl: f64,
    pub pnl_percent: f64,
    #[serde(default)]
    pub leverage: Leverage,
    pub margin_used: f64,
    pub distance_to_liq_pct: Option<f64>,
    pub distance_to_liq_usd: Option<f64>,
    pub risk_level: RiskLevel,
}

/// Per-trader account totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_value: f64,
    pub total_margin_used: f64,
    pub total_unrealized_pnl: f64,
    pub total_position_value: f64,
}

/// Raw snapshots fetched for one trader
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraderSnapshot {
    pub address: String,
    pub fetched_at: String,
    pub hypercore: Option<ClearinghouseState>,
    pub hip3: Option<ClearinghouseState>,
    pub error: Option<String>,
}

/// Processed positions of one trader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraderPositions {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub fetched_at: String,
    pub has_positions: bool,
    pub num_positions: usize,
    pub account_summary: AccountSummary,
    pub positions: Vec<Position>,
    pub error: Option<String>,
}

/// Processed positions file for one fetch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    /// Fetch day as YYYYMMDD
    #[serde(default)]
    pub fetch_date: Option<String>,
    pub fetched_at: String,
    pub market: MarketSelection,
    pub total_users: usize,
    pub users_with_positions: usize,
    pub total_positions: usize,
    pub users: Vec<TraderPositions>,
}

impl PositionsFile {
    pub fn new(builder: Option<&str>, market: MarketSelection, users: Vec<TraderPositions>) -> Self {
        let now = chrono::Utc::now();
        Self {
            builder: builder.map(str::to_string),
            fetch_date: Some(now.format("%Y%m%d").to_string()),
            fetched_at: now.to_rfc3339(),
            market,
            total_users: users.len(),
            users_with_positions: users.iter().filter(|u| u.has_positions).count(),
            total_positions: users.iter().map(|u| u.num_positions).sum(),
            users,
        }
    }
}

/// Raw snapshots file for one fetch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    pub fetched_at: String,
    pub market: MarketSelection,
    pub snapshots: Vec<TraderSnapshot>,
}

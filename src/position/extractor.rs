//! Snapshot -> normalized positions
//!
//! The venue margin summary carries no unrealized PnL figure, so the account
//! total is always derived from the extracted positions of both markets.

use tracing::warn;

use super::risk::RiskClassifier;
use super::{AccountSummary, Direction, MarketType, Position, TraderPositions, TraderSnapshot};
use crate::api::{ClearinghouseState, MarginSummary, PositionData};
use crate::math::{round2, safe_percent};

/// Normalize one raw position. Returns `None` when the coin is missing.
fn normalize(
    raw: &PositionData,
    market_type: MarketType,
    classifier: &RiskClassifier,
) -> Option<Position> {
    let Some(coin) = raw.coin.as_deref().filter(|c| !c.is_empty()) else {
        warn!("Skipping {} position without a coin", market_type);
        return None;
    };

    let szi = raw.szi.unwrap_or(0.0);
    let direction = Direction::from_signed_size(szi);
    let size = szi.abs();
    let entry_price = raw.entry_px.unwrap_or(0.0);
    let position_value = raw.position_value.unwrap_or(0.0);
    let unrealized_pnl = raw.unrealized_pnl.unwrap_or(0.0);
    let liquidation_price = raw.liquidation_px;

    let risk = classifier.assess(
        coin,
        direction,
        size,
        position_value,
        entry_price,
        liquidation_price,
    );

    Some(Position {
        coin: coin.to_string(),
        market_type,
        direction,
        size,
        entry_price,
        liquidation_price,
        position_value,
        unrealized_pnl,
        pnl_percent: round2(safe_percent(unrealized_pnl, position_value)),
        leverage: raw.leverage.clone().unwrap_or_default(),
        margin_used: raw.margin_used.unwrap_or(0.0),
        distance_to_liq_pct: risk.distance_pct,
        distance_to_liq_usd: risk.distance_usd,
        risk_level: risk.risk_level,
    })
}

/// Extract every position in a snapshot, tagged with its market
pub fn extract_positions(
    state: &ClearinghouseState,
    market_type: MarketType,
    classifier: &RiskClassifier,
) -> Vec<Position> {
    state
        .positions()
        .filter_map(|raw| normalize(raw, market_type, classifier))
        .collect()
}

/// Account totals for one trader.
///
/// Account value and margin come from the core market's margin summary,
/// falling back to the HIP-3 one. Position value is the venue-reported
/// notional summed across markets, and is not reconciled against the
/// positions. Unrealized PnL is the sum over `positions`, so positions
/// dropped during extraction do not count toward it.
pub fn account_summary(snapshot: &TraderSnapshot, positions: &[Position]) -> AccountSummary {
    let margin = |state: &Option<ClearinghouseState>| -> Option<MarginSummary> {
        state.as_ref().and_then(|s| s.margin_summary.clone())
    };
    let core = margin(&snapshot.hypercore);
    let hip3 = margin(&snapshot.hip3);
    let primary = core.as_ref().or(hip3.as_ref());

    AccountSummary {
        account_value: primary.and_then(|m| m.account_value).unwrap_or(0.0),
        total_margin_used: primary.and_then(|m| m.total_margin_used).unwrap_or(0.0),
        total_unrealized_pnl: positions.iter().map(|p| p.unrealized_pnl).sum(),
        total_position_value: [core.as_ref(), hip3.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|m| m.total_ntl_pos)
            .sum(),
    }
}

/// Turn one trader's raw snapshots into a processed record.
///
/// A failed fetch carries its error through as a record with no positions.
pub fn process_snapshot(snapshot: &TraderSnapshot, classifier: &RiskClassifier) -> TraderPositions {
    let mut positions = Vec::new();
    if let Some(state) = &snapshot.hypercore {
        positions.extend(extract_positions(state, MarketType::HyperCore, classifier));
    }
    if let Some(state) = &snapshot.hip3 {
        positions.extend(extract_positions(state, MarketType::Hip3, classifier));
    }

    TraderPositions {
        address: snapshot.address.clone(),
        name: None,
        category: None,
        fetched_at: snapshot.fetched_at.clone(),
        has_positions: !positions.is_empty(),
        num_positions: positions.len(),
        account_summary: account_summary(snapshot, &positions),
        positions,
        error: snapshot.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::RiskLevel;

    fn state(raw: &str) -> ClearinghouseState {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_extract_short_position() {
        let s = state(
            r#"{"assetPositions": [{"position": {
                "coin": "BTC", "szi": "-2.5", "entryPx": "100", "positionValue": "250",
                "unrealizedPnl": "-25", "liquidationPx": "105", "marginUsed": "50",
                "leverage": {"type": "cross", "value": 5}
            }}]}"#,
        );
        let positions = extract_positions(&s, MarketType::HyperCore, &RiskClassifier::default());
        assert_eq!(positions.len(), 1);

        let p = &positions[0];
        assert_eq!(p.direction, Direction::Short);
        assert_eq!(p.size, 2.5);
        assert_eq!(p.pnl_percent, -10.0);
        assert_eq!(p.distance_to_liq_usd, Some(5.0));
        assert_eq!(p.distance_to_liq_pct, Some(5.0));
        assert_eq!(p.risk_level, RiskLevel::High);
        assert_eq!(p.leverage.value, Some(5.0));
    }

    #[test]
    fn test_zero_size_position_is_short() {
        // Known edge case: a zero-size position is kept and classified SHORT
        let s = state(
            r#"{"assetPositions": [{"position": {"coin": "ETH", "szi": "0", "entryPx": "10",
                "positionValue": "0", "liquidationPx": "12"}}]}"#,
        );
        let positions = extract_positions(&s, MarketType::HyperCore, &RiskClassifier::default());
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].direction, Direction::Short);
        assert_eq!(positions[0].size, 0.0);
        assert_eq!(positions[0].pnl_percent, 0.0);
        // Implied price falls back to entry: (12 - 10) / 10
        assert_eq!(positions[0].distance_to_liq_pct, Some(20.0));
    }

    #[test]
    fn test_malformed_fields_read_as_zero() {
        let s = state(
            r#"{"assetPositions": [
                {"position": {"coin": "SOL", "szi": "oops", "positionValue": null}},
                {"position": {"szi": "1"}},
                {}
            ]}"#,
        );
        let positions = extract_positions(&s, MarketType::Hip3, &RiskClassifier::default());
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert_eq!(p.market_type, MarketType::Hip3);
        assert_eq!(p.size, 0.0);
        assert_eq!(p.position_value, 0.0);
        assert_eq!(p.liquidation_price, None);
        assert_eq!(p.risk_level, RiskLevel::Unknown);
    }

    #[test]
    fn test_process_snapshot_combines_markets() {
        let snapshot = TraderSnapshot {
            address: "0xa".into(),
            fetched_at: "2025-01-01T00:00:00Z".into(),
            hypercore: Some(state(
                r#"{"assetPositions": [{"position": {"coin": "BTC", "szi": "1",
                    "positionValue": "100", "unrealizedPnl": "5"}}],
                    "marginSummary": {"accountValue": "1000", "totalMarginUsed": "20", "totalNtlPos": "100"}}"#,
            )),
            hip3: Some(state(
                r#"{"assetPositions": [{"position": {"coin": "xyz:XYZ100", "szi": "-1",
                    "positionValue": "50", "unrealizedPnl": "-2"}}],
                    "marginSummary": {"accountValue": "10", "totalNtlPos": "50"}}"#,
            )),
            error: None,
        };

        let processed = process_snapshot(&snapshot, &RiskClassifier::default());
        assert!(processed.has_positions);
        assert_eq!(processed.num_positions, 2);
        assert_eq!(processed.positions[1].market_type, MarketType::Hip3);
        assert_eq!(processed.account_summary.account_value, 1000.0);
        assert_eq!(processed.account_summary.total_margin_used, 20.0);
        assert_eq!(processed.account_summary.total_unrealized_pnl, 3.0);
        assert_eq!(processed.account_summary.total_position_value, 150.0);
    }

    #[test]
    fn test_failed_fetch_degrades_to_no_positions() {
        let snapshot = TraderSnapshot {
            address: "0xa".into(),
            error: Some("Info API returned status 500".into()),
            ..Default::default()
        };
        let processed = process_snapshot(&snapshot, &RiskClassifier::default());
        assert!(!processed.has_positions);
        assert_eq!(processed.num_positions, 0);
        assert_eq!(processed.account_summary, AccountSummary::default());
        assert!(processed.error.is_some());
    }

    #[test]
    fn test_unrealized_pnl_sums_extracted_positions() {
        // No margin summary at all, and one position dropped for lacking a coin
        let snapshot = TraderSnapshot {
            address: "0xb".into(),
            hypercore: Some(state(
                r#"{"assetPositions": [
                    {"position": {"coin": "BTC", "szi": "1", "unrealizedPnl": "7.5"}},
                    {"position": {"szi": "1", "unrealizedPnl": "100"}}
                ]}"#,
            )),
            hip3: Some(state(
                r#"{"assetPositions": [{"position": {"coin": "xyz:GOLD", "szi": "2",
                    "unrealizedPnl": "-1.5"}}]}"#,
            )),
            ..Default::default()
        };

        let processed = process_snapshot(&snapshot, &RiskClassifier::default());
        assert_eq!(processed.num_positions, 2);
        assert_eq!(processed.account_summary.total_unrealized_pnl, 6.0);
        assert_eq!(processed.account_summary.account_value, 0.0);
        assert_eq!(processed.account_summary.total_position_value, 0.0);
    }
}

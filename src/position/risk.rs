//! Liquidation distance and risk tiers
//!
//! The distance from the current price to the liquidation price, as a
//! percentage of the current price, decides the tier. The tier is taken from
//! the unrounded distance; the stored distances are rounded to 2 dp.

use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

use super::{Direction, RiskLevel};
use crate::math::{round2, safe_percent};

/// Distance below which a position is CRITICAL
pub const CRITICAL_DISTANCE_PCT: f64 = 3.0;
/// Distance below which a position is HIGH
pub const HIGH_DISTANCE_PCT: f64 = 7.0;
/// Distance below which a position is MODERATE
pub const MODERATE_DISTANCE_PCT: f64 = 15.0;

/// Map a liquidation distance (%) to its tier. First match wins.
pub fn risk_level_for(distance_pct: f64) -> RiskLevel {
    if distance_pct < CRITICAL_DISTANCE_PCT {
        RiskLevel::Critical
    } else if distance_pct < HIGH_DISTANCE_PCT {
        RiskLevel::High
    } else if distance_pct < MODERATE_DISTANCE_PCT {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

/// Outcome of classifying one position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAssessment {
    pub distance_usd: Option<f64>,
    pub distance_pct: Option<f64>,
    pub risk_level: RiskLevel,
}

impl RiskAssessment {
    pub fn unknown() -> Self {
        Self {
            distance_usd: None,
            distance_pct: None,
            risk_level: RiskLevel::Unknown,
        }
    }
}

/// Classify a position against an independent current price
pub fn classify(
    direction: Direction,
    liquidation_price: Option<f64>,
    current_price: f64,
) -> RiskAssessment {
    let Some(liq) = liquidation_price else {
        return RiskAssessment::unknown();
    };

    let distance_usd = match direction {
        Direction::Long => current_price - liq,
        Direction::Short => liq - current_price,
    };
    let distance_pct = safe_percent(distance_usd, current_price);

    RiskAssessment {
        distance_usd: Some(round2(distance_usd)),
        distance_pct: Some(round2(distance_pct)),
        risk_level: risk_level_for(distance_pct),
    }
}

/// Current price implied by a position: value / size, or entry when size is zero
pub fn implied_price(size: f64, position_value: f64, entry_price: f64) -> f64 {
    if size > 0.0 {
        position_value / size
    } else {
        entry_price
    }
}

/// Classify a position using the price implied by its own value
pub fn classify_from_value(
    direction: Direction,
    size: f64,
    position_value: f64,
    entry_price: f64,
    liquidation_price: Option<f64>,
) -> RiskAssessment {
    classify(
        direction,
        liquidation_price,
        implied_price(size, position_value, entry_price),
    )
}

/// Mark prices known for one run, keyed by coin
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: DashMap<String, f64>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from parsed mid prices
    pub fn from_prices(prices: HashMap<String, f64>) -> Self {
        let cache = Self::new();
        cache.extend(prices);
        cache
    }

    /// Add prices; non-positive prices are ignored
    pub fn extend(&self, prices: impl IntoIterator<Item = (String, f64)>) {
        for (coin, price) in prices {
            self.insert(coin, price);
        }
    }

    pub fn insert(&self, coin: impl Into<String>, price: f64) {
        if price > 0.0 && price.is_finite() {
            self.prices.insert(coin.into(), price);
        }
    }

    pub fn get(&self, coin: &str) -> Option<f64> {
        self.prices.get(coin).map(|p| *p.value())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Risk classifier for one run.
///
/// Uses a cached mark price for the coin when one is known, else the price
/// implied by the position value.
#[derive(Debug, Default)]
pub struct RiskClassifier {
    prices: PriceCache,
}

impl RiskClassifier {
    pub fn new(prices: PriceCache) -> Self {
        Self { prices }
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }

    pub fn assess(
        &self,
        coin: &str,
        direction: Direction,
        size: f64,
        position_value: f64,
        entry_price: f64,
        liquidation_price: Option<f64>,
    ) -> RiskAssessment {
        match self.prices.get(coin) {
            Some(mark) => {
                debug!("Using cached mark {} for {}", mark, coin);
                classify(direction, liquidation_price, mark)
            }
            None => {
                classify_from_value(direction, size, position_value, entry_price, liquidation_price)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_tier_boundaries() {
        assert_eq!(risk_level_for(2.999), RiskLevel::Critical);
        assert_eq!(risk_level_for(3.0), RiskLevel::High);
        assert_eq!(risk_level_for(6.999), RiskLevel::High);
        assert_eq!(risk_level_for(7.0), RiskLevel::Moderate);
        assert_eq!(risk_level_for(14.999), RiskLevel::Moderate);
        assert_eq!(risk_level_for(15.0), RiskLevel::Low);
        assert_eq!(risk_level_for(-4.0), RiskLevel::Critical);
    }

    #[test]
    fn test_short_position_scenario() {
        // szi=-2.5, value=250 -> current price 100, liquidation at 105
        let risk = classify_from_value(Direction::Short, 2.5, 250.0, 100.0, Some(105.0));
        assert_eq!(risk.distance_usd, Some(5.0));
        assert_eq!(risk.distance_pct, Some(5.0));
        assert_eq!(risk.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_long_position() {
        let risk = classify(Direction::Long, Some(80.0), 100.0);
        assert_eq!(risk.distance_usd, Some(20.0));
        assert_eq!(risk.distance_pct, Some(20.0));
        assert_eq!(risk.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_missing_liquidation_is_unknown() {
        let risk = classify_from_value(Direction::Long, 1.0, 100.0, 100.0, None);
        assert_eq!(risk, RiskAssessment::unknown());
    }

    #[test]
    fn test_zero_current_price_is_zero_pct() {
        let risk = classify(Direction::Short, Some(10.0), 0.0);
        assert_eq!(risk.distance_pct, Some(0.0));
        assert_eq!(risk.distance_usd, Some(10.0));
        assert_eq!(risk.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_zero_size_falls_back_to_entry() {
        assert_eq!(implied_price(0.0, 500.0, 42.0), 42.0);
        assert_eq!(implied_price(2.0, 500.0, 42.0), 250.0);
    }

    #[test]
    fn test_tier_uses_unrounded_distance() {
        // 2.996% rounds to 3.0 but is still CRITICAL
        let risk = classify(Direction::Long, Some(97.004), 100.0);
        assert_eq!(risk.distance_pct, Some(3.0));
        assert_eq!(risk.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_classifier_prefers_cached_mark() {
        let cache = PriceCache::new();
        cache.insert("BTC", 110.0);
        cache.insert("BAD", 0.0);
        assert_eq!(cache.len(), 1);

        let classifier = RiskClassifier::new(cache);
        let risk = classifier.assess("BTC", Direction::Long, 1.0, 100.0, 100.0, Some(99.0));
        assert_eq!(risk.distance_usd, Some(11.0));
        assert_eq!(risk.distance_pct, Some(10.0));
        assert_eq!(risk.risk_level, RiskLevel::Moderate);

        // Unknown coin falls back to the implied price
        let risk = classifier.assess("ETH", Direction::Long, 1.0, 100.0, 100.0, Some(99.0));
        assert_eq!(risk.distance_usd, Some(1.0));
        assert_eq!(risk.risk_level, RiskLevel::Critical);
    }
}

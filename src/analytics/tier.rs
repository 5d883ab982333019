//! Performance tiers from historical trader metadata

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag vocabulary and thresholds for tiering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Any of these tags puts a trader in AVOID
    #[serde(default = "default_negative_tags")]
    pub negative_tags: Vec<String>,
    /// STRONG needs at least one of these tags
    #[serde(default = "default_positive_tags")]
    pub positive_tags: Vec<String>,
    /// STRONG needs a win rate strictly above this (percent)
    #[serde(default = "default_min_win_rate")]
    pub min_win_rate: f64,
}

fn default_negative_tags() -> Vec<String> {
    vec!["Negative Pnl".to_string(), "Bad KOL".to_string()]
}

fn default_positive_tags() -> Vec<String> {
    vec![
        "God Tier".to_string(),
        "Consistent Winner".to_string(),
        "Winning Streak".to_string(),
    ]
}

fn default_min_win_rate() -> f64 {
    50.0
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            negative_tags: default_negative_tags(),
            positive_tags: default_positive_tags(),
            min_win_rate: default_min_win_rate(),
        }
    }
}

/// Tags compare case-insensitively, with spaces and underscores read as dashes
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| match c {
            ' ' | '_' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn has_any_tag(categories: &[String], tags: &[String]) -> bool {
    categories.iter().any(|c| {
        let c = normalize_tag(c);
        tags.iter().any(|t| normalize_tag(t) == c)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Strong,
    Watch,
    Avoid,
}

impl PerformanceTier {
    pub const ALL: [PerformanceTier; 3] = [
        PerformanceTier::Strong,
        PerformanceTier::Watch,
        PerformanceTier::Avoid,
    ];
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceTier::Strong => write!(f, "STRONG"),
            PerformanceTier::Watch => write!(f, "WATCH"),
            PerformanceTier::Avoid => write!(f, "AVOID"),
        }
    }
}

/// Assign a performance tier.
///
/// AVOID is checked first, so a negative tag always wins over positive
/// signal. STRONG needs win rate, profit and a positive tag together;
/// anything else is WATCH.
pub fn classify_tier(
    categories: &[String],
    win_rate: Option<f64>,
    total_profit: Option<f64>,
    config: &TierConfig,
) -> PerformanceTier {
    if has_any_tag(categories, &config.negative_tags) {
        return PerformanceTier::Avoid;
    }

    let winning = win_rate.is_some_and(|w| w > config.min_win_rate);
    let profitable = total_profit.is_some_and(|p| p > 0.0);
    if winning && profitable && has_any_tag(categories, &config.positive_tags) {
        return PerformanceTier::Strong;
    }

    PerformanceTier::Watch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn config() -> TierConfig {
        TierConfig {
            negative_tags: tags(&["negative-pnl", "bad-signal-source"]),
            positive_tags: tags(&["God Tier", "consistent-winner"]),
            min_win_rate: 50.0,
        }
    }

    #[test]
    fn test_negative_tag_wins() {
        let tier = classify_tier(
            &tags(&["bad-signal-source"]),
            Some(80.0),
            Some(1000.0),
            &config(),
        );
        assert_eq!(tier, PerformanceTier::Avoid);

        let tier = classify_tier(
            &tags(&["God Tier", "Negative Pnl"]),
            Some(90.0),
            Some(1.0),
            &config(),
        );
        assert_eq!(tier, PerformanceTier::Avoid);
    }

    #[test]
    fn test_strong_needs_every_signal() {
        let cfg = config();
        let god = tags(&["god-tier"]);
        assert_eq!(
            classify_tier(&god, Some(60.0), Some(10.0), &cfg),
            PerformanceTier::Strong
        );
        assert_eq!(
            classify_tier(&god, Some(50.0), Some(10.0), &cfg),
            PerformanceTier::Watch
        );
        assert_eq!(
            classify_tier(&god, Some(60.0), Some(0.0), &cfg),
            PerformanceTier::Watch
        );
        assert_eq!(
            classify_tier(&god, None, Some(10.0), &cfg),
            PerformanceTier::Watch
        );
        assert_eq!(
            classify_tier(&tags(&["Scalper"]), Some(99.0), Some(10.0), &cfg),
            PerformanceTier::Watch
        );
    }

    #[test]
    fn test_default_vocabulary() {
        let cfg = TierConfig::default();
        assert_eq!(
            classify_tier(&tags(&["Bad KOL"]), Some(70.0), Some(5.0), &cfg),
            PerformanceTier::Avoid
        );
        assert_eq!(
            classify_tier(&tags(&["Winning Streak"]), Some(70.0), Some(5.0), &cfg),
            PerformanceTier::Strong
        );
        assert_eq!(
            classify_tier(&[], None, None, &cfg),
            PerformanceTier::Watch
        );
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag(" Negative Pnl "), "negative-pnl");
        assert_eq!(normalize_tag("bad_signal_source"), "bad-signal-source");
    }
}

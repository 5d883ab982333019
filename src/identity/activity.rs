//! Recency filter over merged identities

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::fills::FILLS_DATE_FORMAT;
use super::MergedIdentity;

/// Active-user list as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveUsers {
    pub filtered_at: String,
    pub filter_criteria: String,
    pub total_active_users: usize,
    pub addresses: Vec<String>,
}

/// Oldest `last_trade_date` (YYYYMMDD) still counted as active
pub fn cutoff_date(today: NaiveDate, days: u32) -> String {
    (today - Duration::days(i64::from(days)))
        .format(FILLS_DATE_FORMAT)
        .to_string()
}

/// Addresses whose last builder trade falls within the last `days` days.
///
/// Identities the fills source never saw have no trade date and are inactive.
pub fn filter_active(merged: &[MergedIdentity], today: NaiveDate, days: u32) -> Vec<String> {
    let cutoff = cutoff_date(today, days);
    merged
        .iter()
        .filter(|m| m.last_trade_date().is_some_and(|d| d >= cutoff.as_str()))
        .map(|m| m.address.clone())
        .collect()
}

/// Number of identities per last trade date, newest first
pub fn last_trade_distribution(merged: &[MergedIdentity]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for date in merged.iter().filter_map(MergedIdentity::last_trade_date) {
        *counts.entry(date).or_default() += 1;
    }
    counts
        .into_iter()
        .rev()
        .map(|(date, count)| (date.to_string(), count))
        .collect()
}

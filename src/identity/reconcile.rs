//! Identity reconciliation across the referral and CSV sources
//!
//! Addresses are compared case-insensitively. `compare` reports how the two
//! address sets overlap; `merge` produces exactly one [`MergedIdentity`] per
//! distinct lower-cased address in the union.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::address;
use super::{CsvFields, IdentityRecord, MergedIdentity, Provenance, ReferralFields, Source, SourceFields};
use crate::math::safe_percent;

/// Set-size statistics of one reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationCounts {
    #[serde(rename = "referral_api")]
    pub referral_count: usize,
    #[serde(rename = "csv_method")]
    pub csv_count: usize,
    #[serde(rename = "intersection")]
    pub intersection_count: usize,
    #[serde(rename = "only_in_referral")]
    pub only_referral_count: usize,
    #[serde(rename = "only_in_csv")]
    pub only_csv_count: usize,
    #[serde(rename = "total_unique")]
    pub total_unique_count: usize,
}

/// Input hygiene checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuality {
    #[serde(rename = "invalid_addresses_referral")]
    pub invalid_referral: usize,
    #[serde(rename = "invalid_addresses_csv")]
    pub invalid_csv: usize,
    /// Each source's record count equals its distinct-address count
    pub duplicate_check_passed: bool,
}

impl DataQuality {
    pub fn invalid_total(&self) -> usize {
        self.invalid_referral + self.invalid_csv
    }
}

/// Statistics describing one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub counts: ReconciliationCounts,
    pub data_quality: DataQuality,
    pub overlap_percentage: f64,
}

/// Distinct lower-cased keys of a record set, each with the first original
/// spelling seen.
fn distinct_addresses(records: &[IdentityRecord]) -> HashMap<String, &str> {
    let mut seen = HashMap::with_capacity(records.len());
    for record in records {
        seen.entry(record.key()).or_insert(record.address.as_str());
    }
    seen
}

/// Compare the referral and CSV record sets.
///
/// Pure: the same inputs always give the same report.
pub fn compare(referral: &[IdentityRecord], csv: &[IdentityRecord]) -> ReconciliationReport {
    let referral_addrs = distinct_addresses(referral);
    let csv_addrs = distinct_addresses(csv);

    let referral_keys: HashSet<&String> = referral_addrs.keys().collect();
    let csv_keys: HashSet<&String> = csv_addrs.keys().collect();

    let intersection_count = referral_keys.intersection(&csv_keys).count();
    let only_referral_count = referral_keys.difference(&csv_keys).count();
    let only_csv_count = csv_keys.difference(&referral_keys).count();
    let total_unique_count = intersection_count + only_referral_count + only_csv_count;

    let invalid_referral = referral_addrs
        .values()
        .filter(|a| !address::is_valid(a))
        .count();
    let invalid_csv = csv_addrs.values().filter(|a| !address::is_valid(a)).count();

    ReconciliationReport {
        counts: ReconciliationCounts {
            referral_count: referral_addrs.len(),
            csv_count: csv_addrs.len(),
            intersection_count,
            only_referral_count,
            only_csv_count,
            total_unique_count,
        },
        data_quality: DataQuality {
            invalid_referral,
            invalid_csv,
            duplicate_check_passed: referral_addrs.len() == referral.len()
                && csv_addrs.len() == csv.len(),
        },
        overlap_percentage: safe_percent(intersection_count as f64, total_unique_count as f64),
    }
}

/// Accumulator for one address while merging
struct Pending {
    address: String,
    in_referral: bool,
    in_csv: bool,
    csv: Option<CsvFields>,
    referral: Option<ReferralFields>,
}

impl Pending {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            in_referral: false,
            in_csv: false,
            csv: None,
            referral: None,
        }
    }

    /// Copy a record's fields in. A later source only overwrites fields of
    /// its own shape; a foreign-shaped field already set stays put.
    fn apply(&mut self, fields: &SourceFields, own: Source) {
        match fields {
            SourceFields::Csv(f) => {
                if own == Source::Csv || self.csv.is_none() {
                    self.csv = Some(f.clone());
                }
            }
            SourceFields::Referral(f) => {
                if own == Source::Referral || self.referral.is_none() {
                    self.referral = Some(f.clone());
                }
            }
        }
    }

    fn finish(self) -> Option<MergedIdentity> {
        let provenance = Provenance::from_membership(self.in_referral, self.in_csv)?;
        Some(MergedIdentity {
            address: self.address,
            provenance,
            csv: self.csv,
            referral: self.referral,
        })
    }
}

/// Merge the referral and CSV record sets into one identity per address.
///
/// CSV records are applied first and fix the emitted address casing;
/// referral records are layered on top. Within one source a repeated
/// address takes the later record. Output is ordered by lower-cased address.
pub fn merge(referral: &[IdentityRecord], csv: &[IdentityRecord]) -> Vec<MergedIdentity> {
    let mut pending: BTreeMap<String, Pending> = BTreeMap::new();

    for record in csv {
        let entry = pending
            .entry(record.key())
            .or_insert_with(|| Pending::new(&record.address));
        entry.address = record.address.clone();
        entry.in_csv = true;
        entry.apply(&record.fields, Source::Csv);
    }

    for record in referral {
        let entry = pending
            .entry(record.key())
            .or_insert_with(|| Pending::new(&record.address));
        if !entry.in_csv {
            entry.address = record.address.clone();
        }
        entry.in_referral = true;
        entry.apply(&record.fields, Source::Referral);
    }

    pending.into_values().filter_map(Pending::finish).collect()
}

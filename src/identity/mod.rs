//! Trader identity records and their multi-source reconciliation
//!
//! Two lossy upstream methods report builder users: the referral endpoint and
//! the daily builder-fills CSVs. Each produces [`IdentityRecord`]s; the
//! reconciler merges them into one [`MergedIdentity`] per address.

pub mod activity;
pub mod address;
pub mod fills;
pub mod reconcile;
pub mod referral;
pub mod store;

use serde::{Deserialize, Serialize};

pub use reconcile::{compare, merge, DataQuality, ReconciliationCounts, ReconciliationReport};

/// Upstream method an identity record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Referral,
    Csv,
}

/// Fields only the referral endpoint reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferralFields {
    /// Cumulative volume since referral
    pub volume: f64,
    /// Cumulative rewarded fees since referral
    pub fees_paid: f64,
    /// Join time in epoch milliseconds
    pub joined_timestamp: Option<i64>,
    /// Join time as UTC ISO-8601
    pub joined_date: Option<String>,
}

/// Fields only the builder-fills CSV method reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsvFields {
    pub total_trades: u64,
    /// First day (YYYYMMDD) the user appeared in the fills
    pub first_trade_date: String,
    /// Last day (YYYYMMDD) the user appeared in the fills
    pub last_trade_date: String,
    pub total_volume: f64,
}

/// Source-shaped payload of an identity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceFields {
    Csv(CsvFields),
    Referral(ReferralFields),
}

impl SourceFields {
    /// The source whose record shape these fields follow
    pub fn source(&self) -> Source {
        match self {
            SourceFields::Referral(_) => Source::Referral,
            SourceFields::Csv(_) => Source::Csv,
        }
    }
}

/// One trader as seen by one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Address as reported by the source, casing preserved
    pub address: String,
    #[serde(flatten)]
    pub fields: SourceFields,
}

impl IdentityRecord {
    pub fn referral(address: impl Into<String>, fields: ReferralFields) -> Self {
        Self {
            address: address.into(),
            fields: SourceFields::Referral(fields),
        }
    }

    pub fn csv(address: impl Into<String>, fields: CsvFields) -> Self {
        Self {
            address: address.into(),
            fields: SourceFields::Csv(fields),
        }
    }

    /// Case-insensitive key used for comparison and merging
    pub fn key(&self) -> String {
        address::canonical(&self.address)
    }

    pub fn source(&self) -> Source {
        self.fields.source()
    }
}

/// Which sources contributed a merged identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    ReferralOnly,
    CsvOnly,
    Both,
}

impl Provenance {
    /// Derive provenance from set membership
    pub fn from_membership(in_referral: bool, in_csv: bool) -> Option<Self> {
        match (in_referral, in_csv) {
            (true, true) => Some(Provenance::Both),
            (true, false) => Some(Provenance::ReferralOnly),
            (false, true) => Some(Provenance::CsvOnly),
            (false, false) => None,
        }
    }
}

/// Union of one or two identity records sharing a lower-cased address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedIdentity {
    pub address: String,
    pub provenance: Provenance,
    #[serde(flatten)]
    pub csv: Option<CsvFields>,
    #[serde(flatten)]
    pub referral: Option<ReferralFields>,
}

impl MergedIdentity {
    pub fn key(&self) -> String {
        address::canonical(&self.address)
    }

    /// Last day the user traded through the builder, if the CSV source saw them
    pub fn last_trade_date(&self) -> Option<&str> {
        self.csv.as_ref().map(|c| c.last_trade_date.as_str())
    }
}

//! JSON files for identity sets, merged sets and reconciliation reports

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use super::{IdentityRecord, MergedIdentity, ReconciliationCounts, ReconciliationReport};
use crate::error::{Error, Result};

/// Method tag of referral-endpoint identity files
pub const METHOD_REFERRAL: &str = "referral_api";
/// Method tag of builder-fills identity files
pub const METHOD_FILLS: &str = "historical_csv";

/// One source's identity records for a builder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySet {
    pub builder: String,
    pub builder_address: String,
    pub extracted_at: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_fetched: Option<u32>,
    pub total_users: usize,
    pub users: Vec<IdentityRecord>,
}

impl IdentitySet {
    pub fn new(
        builder: &str,
        builder_address: &str,
        method: &str,
        users: Vec<IdentityRecord>,
    ) -> Self {
        Self {
            builder: builder.to_string(),
            builder_address: builder_address.to_string(),
            extracted_at: chrono::Utc::now().to_rfc3339(),
            method: method.to_string(),
            days_fetched: None,
            total_users: users.len(),
            users,
        }
    }
}

/// Reconciled identity set for a builder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedSet {
    pub builder: String,
    pub builder_address: String,
    pub merged_at: String,
    pub total_users: usize,
    pub validation_summary: ReconciliationCounts,
    pub users: Vec<MergedIdentity>,
}

impl MergedSet {
    pub fn new(
        builder: &str,
        builder_address: &str,
        counts: ReconciliationCounts,
        users: Vec<MergedIdentity>,
    ) -> Self {
        Self {
            builder: builder.to_string(),
            builder_address: builder_address.to_string(),
            merged_at: chrono::Utc::now().to_rfc3339(),
            total_users: users.len(),
            validation_summary: counts,
            users,
        }
    }
}

/// Reconciliation report as written next to the merged set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFile {
    pub builder: String,
    pub generated_at: String,
    #[serde(flatten)]
    pub report: ReconciliationReport,
}

impl ReportFile {
    pub fn new(builder: &str, report: ReconciliationReport) -> Self {
        Self {
            builder: builder.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            report,
        }
    }
}

/// Read a JSON file.
///
/// A missing file is a precondition failure; so is one that does not parse.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::MissingInput(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&raw).map_err(|e| Error::InvalidInput {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Write a value as pretty JSON, creating parent directories
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    info!("Saved {}", path.display());
    Ok(())
}

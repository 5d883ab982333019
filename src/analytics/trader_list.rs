//! Trader metadata lists
//!
//! A trader list is a CSV with at least an `Address` column. The optional
//! columns are `Name`, `Category` (comma-separated tags), `Win Rate`, `Win`,
//! `Loss` and `Total Profit`. Numbers may carry thousands separators.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::identity::address;

/// One row of a trader list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderProfile {
    pub name: String,
    /// Address as written in the list
    pub address: String,
    /// Raw `Category` cell
    pub category: String,
    pub categories: Vec<String>,
    pub win_rate: Option<f64>,
    pub wins: Option<u32>,
    pub losses: Option<u32>,
    pub total_profit: Option<f64>,
}

impl TraderProfile {
    pub fn key(&self) -> String {
        address::canonical(&self.address)
    }
}

#[derive(Debug, Deserialize)]
struct TraderRow {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Address", default)]
    address: Option<String>,
    #[serde(rename = "Category", default)]
    category: Option<String>,
    #[serde(rename = "Win Rate", default)]
    win_rate: Option<String>,
    #[serde(rename = "Win", default)]
    wins: Option<String>,
    #[serde(rename = "Loss", default)]
    losses: Option<String>,
    #[serde(rename = "Total Profit", default)]
    total_profit: Option<String>,
}

/// Split a comma-separated tag cell, dropping blanks
pub fn parse_categories(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a number cell; thousands separators, `$` and `%` are ignored.
/// Blank or unparseable cells are absent.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_count(cell: &str) -> Option<u32> {
    parse_number(cell).filter(|v| *v >= 0.0).map(|v| v as u32)
}

/// Read a trader list from any reader
pub fn read_trader_list<R: Read>(reader: R) -> Result<Vec<TraderProfile>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);

    let mut traders = Vec::new();
    for (line, row) in rdr.deserialize::<TraderRow>().enumerate() {
        let row = row?;
        let Some(addr) = row.address.as_deref().map(str::trim).filter(|a| !a.is_empty()) else {
            warn!("Trader list row {} has no address, skipping", line + 1);
            continue;
        };

        let category = row.category.as_deref().map(str::trim).unwrap_or_default();
        traders.push(TraderProfile {
            name: row.name.as_deref().map(str::trim).unwrap_or_default().to_string(),
            address: addr.to_string(),
            categories: parse_categories(category),
            category: category.to_string(),
            win_rate: row.win_rate.as_deref().and_then(parse_number),
            wins: row.wins.as_deref().and_then(parse_count),
            losses: row.losses.as_deref().and_then(parse_count),
            total_profit: row.total_profit.as_deref().and_then(parse_number),
        });
    }

    Ok(traders)
}

/// Load a trader list file. A missing file is a precondition failure.
pub fn load_trader_list(path: &Path) -> Result<Vec<TraderProfile>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::MissingInput(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let traders = read_trader_list(file).map_err(|e| Error::InvalidInput {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    info!("Loaded {} traders from {}", traders.len(), path.display());
    Ok(traders)
}

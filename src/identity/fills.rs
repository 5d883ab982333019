//! Builder-fills identity source
//!
//! Each day's fills file (`YYYYMMDD.csv`) lists one row per fill routed
//! through the builder. Rows are folded into per-user trade statistics.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{CsvFields, IdentityRecord};
use crate::error::{Error, Result};

/// Date format used in fills file names and trade-date fields
pub const FILLS_DATE_FORMAT: &str = "%Y%m%d";

/// Per-user statistics accumulated across fills days
#[derive(Debug, Default)]
pub struct FillsAggregator {
    users: BTreeMap<String, CsvFields>,
    days_processed: u32,
}

/// Column positions in one fills file
struct Columns {
    user: usize,
    size: Option<usize>,
    px: Option<usize>,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Some(Self {
            user: find("user")?,
            size: find("size").or_else(|| find("sz")),
            px: find("px"),
        })
    }

    /// Notional of one fill, when both size and price columns are present
    fn notional(&self, row: &csv::StringRecord) -> Option<f64> {
        let parse = |idx: usize| row.get(idx).and_then(|v| v.trim().parse::<f64>().ok());
        let size = parse(self.size?)?;
        let px = parse(self.px?)?;
        Some(size.abs() * px)
    }
}

impl FillsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one day's fills into the running statistics.
    ///
    /// Returns `false` when the day contributed nothing (no `user` column or
    /// no rows). Days must be ingested in ascending date order.
    pub fn ingest_day<R: Read>(&mut self, date: &str, reader: R) -> Result<bool> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = rdr.headers()?.clone();
        let Some(columns) = Columns::locate(&headers) else {
            debug!("Fills for {} have no user column", date);
            return Ok(false);
        };

        // user -> (trades, volume) for this day
        let mut day: HashMap<String, (u64, f64)> = HashMap::new();
        for row in rdr.records() {
            let row = row?;
            let Some(user) = row.get(columns.user).map(str::trim).filter(|u| !u.is_empty())
            else {
                continue;
            };
            let entry = day.entry(user.to_string()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += columns.notional(&row).unwrap_or(0.0);
        }

        if day.is_empty() {
            return Ok(false);
        }

        for (user, (trades, volume)) in day {
            let stats = self.users.entry(user).or_insert_with(|| CsvFields {
                first_trade_date: date.to_string(),
                last_trade_date: date.to_string(),
                ..Default::default()
            });
            stats.total_trades += trades;
            stats.total_volume += volume;
            if date > stats.last_trade_date.as_str() {
                stats.last_trade_date = date.to_string();
            }
            if date < stats.first_trade_date.as_str() {
                stats.first_trade_date = date.to_string();
            }
        }

        self.days_processed += 1;
        Ok(true)
    }

    pub fn days_processed(&self) -> u32 {
        self.days_processed
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn into_records(self) -> Vec<IdentityRecord> {
        self.users
            .into_iter()
            .map(|(address, fields)| IdentityRecord::csv(address, fields))
            .collect()
    }
}

/// Outcome of scanning a fills directory
#[derive(Debug, Clone)]
pub struct FillsScan {
    pub records: Vec<IdentityRecord>,
    pub days_scanned: u32,
    pub days_processed: u32,
}

/// Scan `days_back` days of fills ending at `end` (inclusive) from `dir`.
///
/// The directory itself must exist. Missing or unreadable days inside it
/// are skipped.
pub fn scan_fills_dir(dir: &Path, end: NaiveDate, days_back: u32) -> Result<FillsScan> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(format!(
            "fills directory {}",
            dir.display()
        )));
    }

    let start = end - Duration::days(i64::from(days_back));
    let mut aggregator = FillsAggregator::new();
    let mut days_scanned = 0;

    for date in start.iter_days().take_while(|d| *d <= end) {
        days_scanned += 1;
        let date_str = date.format(FILLS_DATE_FORMAT).to_string();
        let path = dir.join(format!("{}.csv", date_str));

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No fills file for {}", date_str);
                continue;
            }
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                continue;
            }
        };

        if let Err(e) = aggregator.ingest_day(&date_str, file) {
            warn!("Skipping fills for {}: {}", date_str, e);
        }
    }

    info!(
        "Processed {}/{} fills days, {} unique users",
        aggregator.days_processed(),
        days_scanned,
        aggregator.user_count()
    );

    Ok(FillsScan {
        days_processed: aggregator.days_processed(),
        records: aggregator.into_records(),
        days_scanned,
    })
}

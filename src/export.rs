//! Flat CSV export of processed positions
//!
//! Two files per run: one row per trader and one row per position. Absent
//! optional values are written as empty cells.

use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::math::{round2, round4};
use crate::position::{Direction, MarketType, PositionsFile, RiskLevel};

/// Tag used in file names when a run has no builder
pub const CUSTOM_TAG: &str = "custom";

#[derive(Debug, Serialize)]
struct UserRow<'a> {
    address: &'a str,
    fetched_at: &'a str,
    has_positions: bool,
    num_positions: usize,
    account_value: f64,
    total_margin_used: f64,
    total_unrealized_pnl: f64,
    total_position_value: f64,
    error: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PositionRow<'a> {
    user_address: &'a str,
    coin: &'a str,
    market_type: MarketType,
    direction: Direction,
    size: f64,
    entry_price: f64,
    liquidation_price: Option<f64>,
    position_value: f64,
    unrealized_pnl: f64,
    pnl_percent: f64,
    leverage_type: Option<&'a str>,
    leverage_value: Option<f64>,
    margin_used: f64,
    distance_to_liq_pct: Option<f64>,
    distance_to_liq_usd: Option<f64>,
    risk_level: RiskLevel,
}

/// Paths written by one export
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub users: PathBuf,
    pub positions: PathBuf,
}

/// Date (YYYYMMDD) a positions file belongs to.
///
/// Taken from the file's `fetch_date`, else from a `_YYYYMMDD` part of its
/// name, else today.
pub fn date_tag(file: &PositionsFile, source: &Path) -> String {
    if let Some(date) = file.fetch_date.as_deref().filter(|d| !d.is_empty()) {
        return date.to_string();
    }

    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Regex::new(r"_(\d{8})")
        .ok()
        .and_then(|re| re.captures(&name).map(|c| c[1].to_string()))
        .unwrap_or_else(|| chrono::Utc::now().format("%Y%m%d").to_string())
}

/// Write the per-user summary CSV
pub fn write_users_csv(path: &Path, file: &PositionsFile) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    for user in &file.users {
        let summary = &user.account_summary;
        writer.serialize(UserRow {
            address: &user.address,
            fetched_at: &user.fetched_at,
            has_positions: user.has_positions,
            num_positions: user.num_positions,
            account_value: round2(summary.account_value),
            total_margin_used: round2(summary.total_margin_used),
            total_unrealized_pnl: round2(summary.total_unrealized_pnl),
            total_position_value: round2(summary.total_position_value),
            error: user.error.as_deref(),
        })?;
    }
    writer.flush()?;
    Ok(file.users.len())
}

/// Write the per-position detail CSV
pub fn write_positions_csv(path: &Path, file: &PositionsFile) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for user in &file.users {
        for p in &user.positions {
            writer.serialize(PositionRow {
                user_address: &user.address,
                coin: &p.coin,
                market_type: p.market_type,
                direction: p.direction,
                size: round4(p.size),
                entry_price: p.entry_price,
                liquidation_price: p.liquidation_price,
                position_value: round2(p.position_value),
                unrealized_pnl: round2(p.unrealized_pnl),
                pnl_percent: p.pnl_percent,
                leverage_type: p.leverage.type_string.as_deref(),
                leverage_value: p.leverage.value,
                margin_used: round2(p.margin_used),
                distance_to_liq_pct: p.distance_to_liq_pct,
                distance_to_liq_usd: p.distance_to_liq_usd,
                risk_level: p.risk_level,
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

/// Export both CSVs for a positions file into `output_dir`
pub fn export_positions(file: &PositionsFile, source: &Path, output_dir: &Path) -> Result<ExportPaths> {
    fs::create_dir_all(output_dir)?;

    let tag = file.builder.as_deref().unwrap_or(CUSTOM_TAG);
    let date = date_tag(file, source);
    let paths = ExportPaths {
        users: output_dir.join(format!("users_summary_{}_{}.csv", tag, date)),
        positions: output_dir.join(format!("positions_detail_{}_{}.csv", tag, date)),
    };

    let users = write_users_csv(&paths.users, file)?;
    info!("Wrote {} users to {}", users, paths.users.display());

    let positions = write_positions_csv(&paths.positions, file)?;
    info!("Wrote {} positions to {}", positions, paths.positions.display());

    Ok(paths)
}

//! CLI command implementations

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::analytics::{
    at_risk_report, builder_summary as build_builder_summary, category_summary, coin_book as build_coin_book,
    load_trader_list, trader_tier_summary, TraderProfile,
};
use crate::api::types::parse_mids;
use crate::api::HyperliquidClient;
use crate::config::Config;
use crate::export::{date_tag, export_positions};
use crate::identity::activity::{cutoff_date, filter_active as select_active, last_trade_distribution, ActiveUsers};
use crate::identity::fills::scan_fills_dir;
use crate::identity::referral::fetch_referral_users;
use crate::identity::store::{
    load_json, save_json, IdentitySet, MergedSet, ReportFile, METHOD_FILLS, METHOD_REFERRAL,
};
use crate::identity::{address, compare, merge};
use crate::position::{
    process_snapshot, MarketSelection, PositionFetcher, PositionsFile, PriceCache, RiskClassifier,
    SnapshotsFile, TraderPositions,
};

const REFERRAL_USERS_FILE: &str = "referral_users.json";
const CSV_USERS_FILE: &str = "csv_users.json";
const MERGED_USERS_FILE: &str = "merged_users.json";
const VALIDATION_REPORT_FILE: &str = "validation_report.json";
const ACTIVE_USERS_FILE: &str = "active_users.json";

fn today() -> String {
    Utc::now().format("%Y%m%d").to_string()
}

/// Default output path next to `input`
fn sibling(input: &Path, name: String) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(&name))
        .unwrap_or_else(|| PathBuf::from(name))
}

/// Read addresses from an active-user list or a merged identity set
fn load_addresses(path: &Path) -> Result<Vec<String>> {
    let value: Value = load_json(path)?;

    let addresses: Vec<String> = if let Some(list) = value.get("addresses").and_then(Value::as_array) {
        list.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    } else if let Some(users) = value.get("users").and_then(Value::as_array) {
        users
            .iter()
            .filter_map(|u| u.get("address").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    } else {
        anyhow::bail!(
            "{} has neither an `addresses` nor a `users` list",
            path.display()
        );
    };

    let invalid = addresses.iter().filter(|a| !address::is_valid(a)).count();
    if invalid > 0 {
        warn!("{} addresses in {} look malformed", invalid, path.display());
    }

    Ok(addresses)
}

/// Snapshot fetch plus processing, shared by the builder and category flows
async fn fetch_and_process(
    config: &Config,
    client: Arc<HyperliquidClient>,
    addresses: &[String],
    market: MarketSelection,
    workers: usize,
    mark_prices: bool,
) -> Result<(SnapshotsFile, Vec<TraderPositions>)> {
    let prices = PriceCache::new();
    if mark_prices {
        if market.includes_hypercore() {
            prices.extend(parse_mids(&client.all_mids(None).await?));
        }
        if market.includes_hip3() {
            prices.extend(parse_mids(&client.all_mids(Some(&config.fetch.hip3_dex)).await?));
        }
        info!("Loaded {} mark prices", prices.len());
    }
    let classifier = RiskClassifier::new(prices);

    let fetcher = PositionFetcher::new(client, workers, &config.fetch.hip3_dex, market);
    let snapshots = fetcher.fetch_all(addresses).await;

    let users: Vec<TraderPositions> = snapshots
        .iter()
        .map(|s| process_snapshot(s, &classifier))
        .collect();

    let raw = SnapshotsFile {
        builder: None,
        fetched_at: Utc::now().to_rfc3339(),
        market,
        snapshots,
    };
    Ok((raw, users))
}

fn print_positions_overview(file: &PositionsFile) {
    println!("\n=== POSITIONS ===\n");
    println!("Traders: {}", file.total_users);
    println!("With positions: {}", file.users_with_positions);
    println!("Total positions: {}", file.total_positions);
    let failed = file.users.iter().filter(|u| u.error.is_some()).count();
    if failed > 0 {
        println!("Failed fetches: {}", failed);
    }
}

/// Fetch builder users from both identity sources and reconcile them
pub async fn fetch_users(
    config: &Config,
    builder: &str,
    fills_dir: Option<PathBuf>,
    days: Option<u32>,
) -> Result<()> {
    let builder_address = config.builder_address(builder)?;
    let users_dir = config.data.users_dir(builder);
    let days = days.unwrap_or(config.fetch.days_to_fetch);

    info!("Fetching users for builder {} ({})", builder, builder_address);

    let client = HyperliquidClient::new(&config.api)?;
    let referral = fetch_referral_users(&client, builder_address).await?;
    let truncated = referral.is_truncated();
    let referral_set = IdentitySet::new(builder, builder_address, METHOD_REFERRAL, referral.records);
    save_json(&users_dir.join(REFERRAL_USERS_FILE), &referral_set)?;

    let fills_dir = fills_dir.unwrap_or_else(|| {
        config
            .data
            .data_dir
            .join("raw")
            .join(builder)
            .join("fills")
    });
    info!("Scanning {} days of fills in {}", days, fills_dir.display());
    let scan = scan_fills_dir(&fills_dir, Utc::now().date_naive(), days)?;
    let mut csv_set = IdentitySet::new(builder, builder_address, METHOD_FILLS, scan.records);
    csv_set.days_fetched = Some(scan.days_processed);
    save_json(&users_dir.join(CSV_USERS_FILE), &csv_set)?;

    let report = compare(&referral_set.users, &csv_set.users);
    let merged = merge(&referral_set.users, &csv_set.users);
    let merged_set = MergedSet::new(builder, builder_address, report.counts, merged);
    save_json(&users_dir.join(MERGED_USERS_FILE), &merged_set)?;
    save_json(
        &users_dir.join(VALIDATION_REPORT_FILE),
        &ReportFile::new(builder, report.clone()),
    )?;

    let counts = report.counts;
    println!("\n=== USER RECONCILIATION: {} ===\n", builder);
    println!("Referral endpoint: {}", counts.referral_count);
    if truncated {
        println!("  (truncated: {} reported)", referral.n_referrals);
    }
    println!(
        "Builder fills: {} ({}/{} days)",
        counts.csv_count, scan.days_processed, scan.days_scanned
    );
    println!("Both: {}", counts.intersection_count);
    println!("Referral only: {}", counts.only_referral_count);
    println!("Fills only: {}", counts.only_csv_count);
    println!("Total unique: {}", counts.total_unique_count);
    println!("Overlap: {:.1}%", report.overlap_percentage);
    if report.data_quality.invalid_total() > 0 {
        println!("Invalid addresses: {}", report.data_quality.invalid_total());
    }
    if !report.data_quality.duplicate_check_passed {
        println!("Duplicate addresses found in at least one source");
    }

    Ok(())
}

/// Keep merged users that traded within the recency window
pub fn filter_active(config: &Config, merged_path: &Path, days: Option<u32>, output: Option<PathBuf>) -> Result<()> {
    let days = days.unwrap_or(config.report.active_days);
    let merged: MergedSet = load_json(merged_path)?;

    let today = Utc::now().date_naive();
    let addresses = select_active(&merged.users, today, days);
    let active = ActiveUsers {
        filtered_at: Utc::now().to_rfc3339(),
        filter_criteria: format!("last_trade_date >= {}", cutoff_date(today, days)),
        total_active_users: addresses.len(),
        addresses,
    };

    let output = output.unwrap_or_else(|| sibling(merged_path, ACTIVE_USERS_FILE.to_string()));
    save_json(&output, &active)?;

    println!("\n=== ACTIVE USERS ===\n");
    println!("Merged users: {}", merged.users.len());
    println!("Active in last {} days: {}", days, active.total_active_users);
    println!("\nLast trade dates:");
    for (date, count) in last_trade_distribution(&merged.users).iter().take(10) {
        println!("  {}: {}", date, count);
    }

    Ok(())
}

/// Fetch and process positions for a builder's users or an address list
pub async fn fetch_positions(
    config: &Config,
    builder: Option<&str>,
    input: Option<PathBuf>,
    market: MarketSelection,
    workers: Option<usize>,
    mark_prices: bool,
) -> Result<()> {
    let input = match (input, builder) {
        (Some(path), _) => path,
        (None, Some(builder)) => {
            let dir = config.data.users_dir(builder);
            let active = dir.join(ACTIVE_USERS_FILE);
            if active.exists() {
                active
            } else {
                dir.join(MERGED_USERS_FILE)
            }
        }
        (None, None) => anyhow::bail!("either a builder or --input is required"),
    };

    let addresses = load_addresses(&input)?;
    if addresses.is_empty() {
        anyhow::bail!("no addresses in {}", input.display());
    }
    info!("Loaded {} addresses from {}", addresses.len(), input.display());

    let client = Arc::new(HyperliquidClient::new(&config.api)?);
    let workers = workers.unwrap_or(config.fetch.workers);
    let (mut raw, users) =
        fetch_and_process(config, client, &addresses, market, workers, mark_prices).await?;

    let out_dir = match builder {
        Some(b) => config.data.positions_dir(b),
        None => config.data.custom_dir(),
    };
    let date = today();

    raw.builder = builder.map(str::to_string);
    save_json(&out_dir.join(format!("raw_positions_{}.json", date)), &raw)?;

    let file = PositionsFile::new(builder, market, users);
    save_json(&out_dir.join(format!("processed_positions_{}.json", date)), &file)?;

    print_positions_overview(&file);
    Ok(())
}

/// Fetch positions for a trader list and summarize sentiment per category
pub async fn by_category(
    config: &Config,
    traders_path: &Path,
    market: MarketSelection,
    workers: Option<usize>,
) -> Result<()> {
    let profiles = load_trader_list(traders_path)?;
    let addresses: Vec<String> = profiles.iter().map(|p| p.address.clone()).collect();
    if addresses.is_empty() {
        anyhow::bail!("no traders in {}", traders_path.display());
    }

    let client = Arc::new(HyperliquidClient::new(&config.api)?);
    let workers = workers.unwrap_or(config.fetch.workers);
    let (_, mut users) = fetch_and_process(config, client, &addresses, market, workers, false).await?;

    let by_address: HashMap<String, &TraderProfile> = profiles.iter().map(|p| (p.key(), p)).collect();
    for user in &mut users {
        if let Some(profile) = by_address.get(&address::canonical(&user.address)) {
            user.name = Some(profile.name.clone());
            user.category = Some(profile.category.clone());
        }
    }

    let source_file = traders_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let summary = category_summary(&users, source_file.as_deref());

    let out_dir = config.data.custom_dir();
    let date = today();
    save_json(
        &out_dir.join(format!("category_positions_{}.json", date)),
        &PositionsFile::new(None, market, users),
    )?;
    save_json(&out_dir.join(format!("category_summary_{}.json", date)), &summary)?;

    println!("\n=== SENTIMENT BY CATEGORY ===\n");
    for (category, rollup) in &summary.by_category {
        println!(
            "{}: {} traders ({} with positions), {} long / {} short, ratio {:.2}",
            category,
            rollup.traders,
            rollup.traders_with_positions,
            rollup.longs,
            rollup.shorts,
            rollup.long_short_ratio
        );
        println!(
            "  Long value: ${:.2}  Short value: ${:.2}",
            rollup.total_long_value, rollup.total_short_value
        );
    }

    Ok(())
}

/// Summarize a processed positions file
pub fn builder_summary(config: &Config, positions_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let file: PositionsFile = load_json(positions_path)?;
    let summary = build_builder_summary(&file, config.report.top_positions);

    let output = output.unwrap_or_else(|| {
        sibling(
            positions_path,
            format!("summary_{}.json", date_tag(&file, positions_path)),
        )
    });
    save_json(&output, &summary)?;

    let totals = &summary.summary;
    println!("\n=== BUILDER SUMMARY ===\n");
    println!("Users: {}", totals.total_users);
    println!("With positions: {}", totals.users_with_positions);
    println!("Positions: {}", totals.total_positions);
    println!("Total value: ${:.2}", totals.total_position_value);
    println!("Avg positions per user: {:.2}", totals.avg_positions_per_user);

    println!("\nTop coins:");
    for coin in summary.by_coin.iter().take(10) {
        println!(
            "  {:<10} {:>4} positions  ${:>14.2}  L/S {:.2}",
            coin.coin, coin.stats.count, coin.stats.total_value, coin.stats.long_short_ratio
        );
    }

    println!("\nRisk distribution:");
    for (level, count) in &summary.risk_distribution {
        println!("  {:<9} {}", level, count);
    }

    Ok(())
}

/// Tier the traders of a trader list against a processed positions file
pub fn trader_summary(
    config: &Config,
    traders_path: &Path,
    positions_path: &Path,
    output: Option<PathBuf>,
) -> Result<()> {
    let profiles = load_trader_list(traders_path)?;
    let file: PositionsFile = load_json(positions_path)?;
    let summary = trader_tier_summary(
        &profiles,
        &file,
        &config.tiers,
        config.report.top_coins_per_trader,
    );

    let output = output.unwrap_or_else(|| {
        sibling(
            positions_path,
            format!("trader_summary_{}.json", date_tag(&file, positions_path)),
        )
    });
    save_json(&output, &summary)?;

    println!("\n=== TRADER TIERS ===\n");
    println!("Traders: {}", summary.summary.total_traders);
    println!("With positions: {}", summary.summary.traders_with_positions);
    for (tier, traders) in &summary.by_performance_tier {
        println!("\n{} ({})", tier, traders.len());
        for t in traders.iter().take(10) {
            println!(
                "  {:<20} profit {:>12}  positions {:>3}  [{}]",
                t.name,
                t.total_profit
                    .map(|p| format!("{:.2}", p))
                    .unwrap_or_else(|| "-".to_string()),
                t.num_positions,
                t.top_coins.join(", ")
            );
        }
    }

    Ok(())
}

/// Print positions close to liquidation
pub fn at_risk(positions_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let file: PositionsFile = load_json(positions_path)?;
    let rows = at_risk_report(&file.users);

    if let Some(output) = output {
        save_json(&output, &rows)?;
    }

    println!("\n=== AT-RISK POSITIONS ({}) ===\n", rows.len());
    if rows.is_empty() {
        println!("No positions within the HIGH risk threshold.");
    }
    for row in &rows {
        let p = &row.position;
        println!(
            "{:<9} {} {:<8} {:<5} value ${:.2}  liq {}  distance {}",
            p.risk_level,
            row.address,
            p.coin,
            p.direction,
            p.position_value,
            p.liquidation_price
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".to_string()),
            p.distance_to_liq_pct
                .map(|v| format!("{:.2}%", v))
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}

/// Print the long and short book for one coin
pub fn coin_book(positions_path: &Path, coin: &str, output: Option<PathBuf>) -> Result<()> {
    let file: PositionsFile = load_json(positions_path)?;
    let book = build_coin_book(&file.users, coin);

    if let Some(output) = output {
        save_json(&output, &book)?;
    }

    let s = &book.summary;
    println!("\n=== {} BOOK ===\n", coin.to_uppercase());
    println!("Longs: {} (${:.2})", s.total_longs, s.total_long_value);
    println!("Shorts: {} (${:.2})", s.total_shorts, s.total_short_value);
    println!("Long/short ratio: {:.2}", s.long_short_ratio);

    for (label, rows) in [("LONGS", &book.longs), ("SHORTS", &book.shorts)] {
        println!("\n{}:", label);
        for row in rows.iter().take(20) {
            println!(
                "  {} size {:.4} value ${:.2} pnl ${:.2} {}",
                row.address,
                row.position.size,
                row.position.position_value,
                row.position.unrealized_pnl,
                row.position.risk_level
            );
        }
    }

    Ok(())
}

/// Export a processed positions file to CSV
pub fn export_csv(positions_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let file: PositionsFile = load_json(positions_path)?;
    let output_dir = output_dir
        .or_else(|| positions_path.parent().map(Path::to_path_buf))
        .context("cannot determine an output directory")?;

    let paths = export_positions(&file, positions_path, &output_dir)?;
    println!("Users: {}", paths.users.display());
    println!("Positions: {}", paths.positions.display());
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.display_masked());
    Ok(())
}

//! hla - Hyperliquid builder-user reconciliation and position risk analytics

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use hl_analysis::cli::commands;
use hl_analysis::config::Config;
use hl_analysis::position::MarketSelection;

/// Hyperliquid builder-user and position analytics
#[derive(Parser)]
#[command(name = "hla")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "HLA_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch builder users from the referral endpoint and fills, then reconcile
    FetchUsers {
        /// Builder name from the [builders] table
        builder: String,

        /// Directory of daily YYYYMMDD.csv builder-fills files
        #[arg(long)]
        fills_dir: Option<PathBuf>,

        /// Days of fills to scan (default: fetch.days_to_fetch)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Keep merged users that traded recently
    FilterActive {
        /// Merged users file
        merged: PathBuf,

        /// Recency window in days (default: report.active_days)
        #[arg(long)]
        days: Option<u32>,

        /// Output file (default: active_users.json next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch account snapshots and build processed positions
    FetchPositions {
        /// Builder name; selects the default input and output directories
        builder: Option<String>,

        /// Address list (active-user list or merged users file)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Markets to query: hypercore, hip3 or both
        #[arg(long, default_value = "both")]
        market: MarketSelection,

        /// Concurrent requests (default: fetch.workers)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Classify risk against current mark prices
        #[arg(long)]
        mark_prices: bool,
    },

    /// Fetch positions for a trader list and summarize sentiment by category
    ByCategory {
        /// Trader list CSV (Name, Address, Category)
        traders: PathBuf,

        /// Markets to query: hypercore, hip3 or both
        #[arg(long, default_value = "both")]
        market: MarketSelection,

        /// Concurrent requests (default: fetch.workers)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Summarize a processed positions file
    BuilderSummary {
        positions: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Join a trader list to processed positions and assign performance tiers
    TraderSummary {
        /// Trader list CSV
        traders: PathBuf,

        positions: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List CRITICAL and HIGH risk positions
    AtRisk {
        positions: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show all longs and shorts in one coin
    CoinBook {
        positions: PathBuf,

        coin: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a processed positions file to CSV
    ExportCsv {
        positions: PathBuf,

        /// Output directory (default: next to the input)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Show current configuration (secrets masked)
    ShowConfig,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hl_analysis=info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json_logs);

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::FetchUsers {
            builder,
            fills_dir,
            days,
        } => commands::fetch_users(&config, &builder, fills_dir, days).await,
        Commands::FilterActive {
            merged,
            days,
            output,
        } => commands::filter_active(&config, &merged, days, output),
        Commands::FetchPositions {
            builder,
            input,
            market,
            workers,
            mark_prices,
        } => {
            commands::fetch_positions(
                &config,
                builder.as_deref(),
                input,
                market,
                workers,
                mark_prices,
            )
            .await
        }
        Commands::ByCategory {
            traders,
            market,
            workers,
        } => commands::by_category(&config, &traders, market, workers).await,
        Commands::BuilderSummary { positions, output } => {
            commands::builder_summary(&config, &positions, output)
        }
        Commands::TraderSummary {
            traders,
            positions,
            output,
        } => commands::trader_summary(&config, &traders, &positions, output),
        Commands::AtRisk { positions, output } => commands::at_risk(&positions, output),
        Commands::CoinBook {
            positions,
            coin,
            output,
        } => commands::coin_book(&positions, &coin, output),
        Commands::ExportCsv {
            positions,
            output_dir,
        } => commands::export_csv(&positions, output_dir),
        Commands::ShowConfig => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::identity::address;

// Re-export performance tier config
pub use crate::analytics::tier::TierConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    /// Builder name -> builder address
    #[serde(default = "default_builders")]
    pub builders: BTreeMap<String, String>,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub tiers: TierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_info_url")]
    pub info_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Client-side rate limit shared by all fetch workers
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            info_url: default_info_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Directory holding per-source and merged identity files for a builder
    pub fn users_dir(&self, builder: &str) -> PathBuf {
        self.processed_dir().join(builder).join("source").join("users")
    }

    /// Directory holding raw and processed position files for a builder
    pub fn positions_dir(&self, builder: &str) -> PathBuf {
        self.processed_dir()
            .join(builder)
            .join("source")
            .join("positions")
    }

    /// Directory for ad-hoc (non-builder) runs such as category sentiment
    pub fn custom_dir(&self) -> PathBuf {
        self.processed_dir().join("custom")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum concurrent snapshot requests
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// DEX name queried for HIP-3 positions
    #[serde(default = "default_hip3_dex")]
    pub hip3_dex: String,
    /// Days of builder fills scanned by the CSV identity source
    #[serde(default = "default_days_to_fetch")]
    pub days_to_fetch: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            hip3_dex: default_hip3_dex(),
            days_to_fetch: default_days_to_fetch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_top_positions")]
    pub top_positions: usize,
    #[serde(default = "default_top_coins_per_trader")]
    pub top_coins_per_trader: usize,
    /// Recency window for the active-user filter
    #[serde(default = "default_active_days")]
    pub active_days: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_positions: default_top_positions(),
            top_coins_per_trader: default_top_coins_per_trader(),
            active_days: default_active_days(),
        }
    }
}

// Default value functions
fn default_info_url() -> String {
    std::env::var("HYPERLIQUID_INFO_URL")
        .unwrap_or_else(|_| "https://api.hyperliquid.xyz/info".into())
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_builders() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "insilico".to_string(),
            "0x2868fc0d9786a740b491577a43502259efa78a39".to_string(),
        ),
        (
            "basedapp".to_string(),
            "0x1924b8561eef20e70ede628a296175d358be80e5".to_string(),
        ),
    ])
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_workers() -> usize {
    10
}

fn default_hip3_dex() -> String {
    "xyz".to_string()
}

fn default_days_to_fetch() -> u32 {
    50
}

fn default_top_positions() -> usize {
    50
}

fn default_top_coins_per_trader() -> usize {
    3
}

fn default_active_days() -> u32 {
    7
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("api.info_url", default_info_url())?
            .set_default("api.timeout_secs", default_timeout_secs() as i64)?
            .set_default("api.max_retries", default_max_retries() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix HLA_)
            .add_source(
                config::Environment::with_prefix("HLA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Builder addresses are used as URL path segments and map keys
        for address in config.builders.values_mut() {
            *address = address.to_lowercase();
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.fetch.workers == 0 {
            anyhow::bail!("fetch.workers must be at least 1");
        }

        if self.api.requests_per_second == 0 {
            anyhow::bail!("api.requests_per_second must be at least 1");
        }

        if self.fetch.hip3_dex.trim().is_empty() {
            anyhow::bail!("fetch.hip3_dex cannot be empty");
        }

        if self.report.top_positions == 0 {
            anyhow::bail!("report.top_positions must be at least 1");
        }

        for (name, builder) in &self.builders {
            if !address::is_valid(builder) {
                anyhow::bail!("builder {} has an invalid address: {}", name, builder);
            }
        }

        Ok(())
    }

    /// Look up a configured builder address by name
    pub fn builder_address(&self, name: &str) -> crate::error::Result<&str> {
        self.builders
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| crate::error::Error::UnknownBuilder(name.to_string()))
    }

    /// Display configuration with secrets masked
    pub fn display_masked(&self) -> String {
        let builders = self
            .builders
            .iter()
            .map(|(name, addr)| format!("  {} = {}", name, addr))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Configuration:
[api]
  info_url = {}
  timeout_secs = {}
  max_retries = {}
  requests_per_second = {}

[builders]
{}

[data]
  data_dir = {}

[fetch]
  workers = {}
  hip3_dex = {}
  days_to_fetch = {}

[report]
  top_positions = {}
  top_coins_per_trader = {}
  active_days = {}

[tiers]
  negative_tags = {:?}
  positive_tags = {:?}
  min_win_rate = {}
"#,
            mask_url(&self.api.info_url),
            self.api.timeout_secs,
            self.api.max_retries,
            self.api.requests_per_second,
            builders,
            self.data.data_dir.display(),
            self.fetch.workers,
            self.fetch.hip3_dex,
            self.fetch.days_to_fetch,
            self.report.top_positions,
            self.report.top_coins_per_trader,
            self.report.active_days,
            self.tiers.negative_tags,
            self.tiers.positive_tags,
            self.tiers.min_win_rate,
        )
    }
}

/// Mask query parameters in URL (may contain API keys)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            builders: default_builders(),
            data: DataConfig::default(),
            fetch: FetchConfig::default(),
            report: ReportConfig::default(),
            tiers: TierConfig::default(),
        }
    }
}

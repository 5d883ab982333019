//! Hyperliquid builder-user reconciliation and position risk analytics
//!
//! Identity records from two lossy sources are merged per address; account
//! snapshots are normalized into positions, tagged with a liquidation risk
//! tier and rolled up into reports.

pub mod analytics;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod identity;
pub mod math;
pub mod position;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};

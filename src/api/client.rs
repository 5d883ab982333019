//! Info API client
//!
//! All requests go through one rate limiter shared by every fetch worker,
//! and transient failures are retried with exponential backoff.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::types::{AllMids, ClearinghouseState, InfoRequest, ReferralResponse};
use super::SnapshotSource;
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Client for the Hyperliquid info endpoint
pub struct HyperliquidClient {
    http: reqwest::Client,
    info_url: String,
    max_retries: u32,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl HyperliquidClient {
    /// Create a new client from the API configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let rps = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            Error::Config("api.requests_per_second must be at least 1".to_string())
        })?;
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        info!(
            "Info API client initialized for {} ({} req/s, {} retries)",
            config.info_url, config.requests_per_second, config.max_retries
        );

        Ok(Self {
            http,
            info_url: config.info_url.clone(),
            max_retries: config.max_retries,
            limiter,
        })
    }

    /// Account snapshot on the core market, or on a named HIP-3 DEX
    pub async fn clearinghouse_state(
        &self,
        user: &str,
        dex: Option<&str>,
    ) -> Result<ClearinghouseState> {
        let request = InfoRequest::ClearinghouseState {
            user: user.to_string(),
            dex: dex.map(str::to_string),
        };
        let state: Option<ClearinghouseState> = self.post_info(&request).await?;
        Ok(state.unwrap_or_default())
    }

    /// Referral state of a builder address
    pub async fn referral_state(&self, builder: &str) -> Result<ReferralResponse> {
        let request = InfoRequest::Referral {
            user: builder.to_string(),
        };
        let response: Option<ReferralResponse> = self.post_info(&request).await?;
        response.ok_or_else(|| {
            Error::MissingInput(format!("referral state for builder {}", builder))
        })
    }

    /// Mid prices for every coin on the core market, or on a HIP-3 DEX
    pub async fn all_mids(&self, dex: Option<&str>) -> Result<AllMids> {
        let request = InfoRequest::AllMids {
            dex: dex.map(str::to_string),
        };
        let mids: Option<AllMids> = self.post_info(&request).await?;
        Ok(mids.unwrap_or_default())
    }

    /// Post an info request with retry on transient failures
    async fn post_info<T: DeserializeOwned>(&self, request: &InfoRequest) -> Result<T> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let attempts = AtomicU32::new(0);
        let max_retries = self.max_retries;

        retry(backoff, || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                match self.post_once(request).await {
                    Ok(body) => Ok(body),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        warn!("Retryable info API error (attempt {}): {}", attempt + 1, e);
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => {
                        error!("Info API request failed: {}", e);
                        Err(backoff::Error::permanent(e))
                    }
                }
            }
        })
        .await
    }

    /// Single rate-limited request
    async fn post_once<T: DeserializeOwned>(&self, request: &InfoRequest) -> Result<T> {
        self.limiter.until_ready().await;
        debug!("POST {} {:?}", self.info_url, request);

        let response = self.http.post(&self.info_url).json(request).send().await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(Error::AccessDenied);
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SnapshotSource for HyperliquidClient {
    async fn fetch(&self, address: &str, dex: Option<&str>) -> Result<ClearinghouseState> {
        self.clearinghouse_state(address, dex).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_zero_rate() {
        let config = ApiConfig {
            requests_per_second: 0,
            ..Default::default()
        };
        assert!(matches!(
            HyperliquidClient::new(&config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_without_retry_budget() {
        let config = ApiConfig {
            info_url: "http://127.0.0.1:9/info".into(),
            timeout_secs: 1,
            max_retries: 0,
            requests_per_second: 100,
        };
        let client = HyperliquidClient::new(&config).unwrap();
        let result = client.clearinghouse_state("0xabc", None).await;
        assert!(result.is_err());
    }
}

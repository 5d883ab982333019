//! Referral-endpoint identity source
//!
//! The endpoint returns every user referred by a builder together with
//! cumulative volume and fees. It may truncate: `nReferrals` can exceed the
//! number of entries returned.

use chrono::{DateTime, SecondsFormat};
use tracing::{info, warn};

use super::{IdentityRecord, ReferralFields};
use crate::api::{HyperliquidClient, ReferralResponse};
use crate::error::{Error, Result};

/// Identity records extracted from one referral response
#[derive(Debug, Clone, Default)]
pub struct ReferralExtract {
    /// Total referrals the endpoint claims to know about
    pub n_referrals: u64,
    pub records: Vec<IdentityRecord>,
}

impl ReferralExtract {
    /// True when the endpoint returned fewer entries than it reports
    pub fn is_truncated(&self) -> bool {
        (self.records.len() as u64) < self.n_referrals
    }
}

/// Convert epoch milliseconds to a UTC ISO-8601 string
pub fn joined_date(timestamp_ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Turn a referral response into identity records.
///
/// Entries without a `user` are dropped; missing numeric fields read as 0.
pub fn referral_records(response: &ReferralResponse) -> ReferralExtract {
    let Some(data) = response
        .referrer_state
        .as_ref()
        .and_then(|state| state.data.as_ref())
    else {
        return ReferralExtract::default();
    };

    let mut records = Vec::with_capacity(data.referral_states.len());
    for entry in &data.referral_states {
        let Some(user) = entry.user.as_deref() else {
            warn!("Skipping referral entry without a user address");
            continue;
        };

        let joined_timestamp = entry.time_joined.filter(|ts| *ts > 0);
        records.push(IdentityRecord::referral(
            user,
            ReferralFields {
                volume: entry.cum_vlm.unwrap_or(0.0),
                fees_paid: entry.cum_rewarded_fees_since_referred.unwrap_or(0.0),
                joined_timestamp,
                joined_date: joined_timestamp.and_then(joined_date),
            },
        ));
    }

    ReferralExtract {
        n_referrals: data.n_referrals.unwrap_or(records.len() as u64),
        records,
    }
}

/// Extract referred users, requiring the response to carry referrer data.
///
/// A response without `referrerState.data` is a missing input, not an empty
/// set.
pub fn require_referral_records(
    response: &ReferralResponse,
    builder_address: &str,
) -> Result<ReferralExtract> {
    let has_data = response
        .referrer_state
        .as_ref()
        .is_some_and(|state| state.data.is_some());
    if !has_data {
        return Err(Error::MissingInput(format!(
            "referral state for builder {}",
            builder_address
        )));
    }
    Ok(referral_records(response))
}

/// Fetch and extract the referred users of a builder
pub async fn fetch_referral_users(
    client: &HyperliquidClient,
    builder_address: &str,
) -> Result<ReferralExtract> {
    let response = client.referral_state(builder_address).await?;
    let extract = require_referral_records(&response, builder_address)?;

    info!(
        "Referral endpoint: {} users reported, {} returned",
        extract.n_referrals,
        extract.records.len()
    );
    if extract.is_truncated() {
        warn!(
            "Referral response truncated: {} of {} users returned",
            extract.records.len(),
            extract.n_referrals
        );
    }

    Ok(extract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SourceFields;

    fn response(raw: &str) -> ReferralResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_referral_records() {
        let resp = response(
            r#"{"referrerState": {"data": {"nReferrals": 5, "referralStates": [
                {"user": "0xAbC0000000000000000000000000000000000001", "cumVlm": "1500.5",
                 "cumRewardedFeesSinceReferred": "1.25", "timeJoined": 1735689600000},
                {"user": "0xdef0000000000000000000000000000000000002"},
                {"cumVlm": "10"}
            ]}}}"#,
        );
        let extract = referral_records(&resp);
        assert_eq!(extract.n_referrals, 5);
        assert_eq!(extract.records.len(), 2);
        assert!(extract.is_truncated());

        let SourceFields::Referral(first) = &extract.records[0].fields else {
            panic!("expected referral fields");
        };
        assert_eq!(first.volume, 1500.5);
        assert_eq!(first.fees_paid, 1.25);
        assert_eq!(first.joined_timestamp, Some(1_735_689_600_000));
        assert_eq!(first.joined_date.as_deref(), Some("2025-01-01T00:00:00Z"));

        let SourceFields::Referral(second) = &extract.records[1].fields else {
            panic!("expected referral fields");
        };
        assert_eq!(second.volume, 0.0);
        assert_eq!(second.joined_date, None);
    }

    #[test]
    fn test_empty_referral_response() {
        let extract = referral_records(&response("{}"));
        assert!(extract.records.is_empty());
        assert_eq!(extract.n_referrals, 0);
        assert!(!extract.is_truncated());
    }

    #[test]
    fn test_missing_referrer_data_is_precondition_failure() {
        let err = require_referral_records(&response("{}"), "0xbuilder").unwrap_err();
        assert!(err.is_precondition_failure());

        let no_data = response(r#"{"referrerState": {"stage": "needToCreateCode"}}"#);
        let err = require_referral_records(&no_data, "0xbuilder").unwrap_err();
        assert!(err.is_precondition_failure());

        let extract = require_referral_records(
            &response(r#"{"referrerState": {"data": {"referralStates": []}}}"#),
            "0xbuilder",
        )
        .unwrap();
        assert!(extract.records.is_empty());
    }
}

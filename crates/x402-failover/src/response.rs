use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::X402_VERSION;

/// Response from a facilitator's `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

/// Response from a facilitator's `/settle` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
    /// Transaction hash, if settlement succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default)]
    pub network: String,
}

/// One scheme/network pair a facilitator can handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    #[serde(default = "default_version")]
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
}

fn default_version() -> u32 {
    X402_VERSION
}

/// Response from a facilitator's `/supported` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupportedResponse {
    #[serde(default)]
    pub kinds: Vec<SupportedKind>,
}

/// One facilitator's failure as reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Display name of the facilitator.
    pub facilitator: String,
    pub error: String,
}

/// Body of the 503 returned once every facilitator has been exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableResponse {
    pub error: String,
    pub details: Vec<FailureDetail>,
    pub timestamp: DateTime<Utc>,
}

impl UnavailableResponse {
    pub fn new(details: Vec<FailureDetail>) -> Self {
        Self {
            error: "All payment facilitators are currently unavailable".to_string(),
            details,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_response_parses_minimal_body() {
        let parsed: VerifyResponse = serde_json::from_str(r#"{"isValid":true}"#).unwrap();
        assert!(parsed.is_valid);
        assert!(parsed.invalid_reason.is_none());
        assert!(parsed.payer.is_none());
    }

    #[test]
    fn test_settle_response_tolerates_missing_network() {
        let parsed: SettleResponse =
            serde_json::from_str(r#"{"success":false,"errorReason":"insufficient_funds"}"#)
                .unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error_reason.as_deref(), Some("insufficient_funds"));
        assert_eq!(parsed.network, "");
    }

    #[test]
    fn test_unavailable_response_shape() {
        let body = UnavailableResponse::new(vec![FailureDetail {
            facilitator: "X402 RS".to_string(),
            error: "Timeout after 5000ms".to_string(),
        }]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json["error"],
            "All payment facilitators are currently unavailable"
        );
        assert_eq!(json["details"][0]["facilitator"], "X402 RS");
        assert_eq!(json["details"][0]["error"], "Timeout after 5000ms");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }
}

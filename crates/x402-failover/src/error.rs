use serde::Serialize;
use thiserror::Error;

use crate::facilitator::FacilitatorReply;
use crate::response::FailureDetail;

/// Machine-readable failure classification shared by single calls and whole dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Timeout,
    NetworkError,
    AuthError,
    InvalidResponse,
    ServerFault,
    AllFailed,
    NoHealthyFacilitator,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::AuthError => "AUTH_ERROR",
            ErrorKind::InvalidResponse => "INVALID_RESPONSE",
            ErrorKind::ServerFault => "SERVER_FAULT",
            ErrorKind::AllFailed => "ALL_FAILED",
            ErrorKind::NoHealthyFacilitator => "NO_HEALTHY_FACILITATOR",
        }
    }
}

/// Failure of one call to one facilitator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacilitatorError {
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP {0}")]
    ServerFault(u16),
}

impl FacilitatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FacilitatorError::Timeout(_) => ErrorKind::Timeout,
            FacilitatorError::Network(_) => ErrorKind::NetworkError,
            FacilitatorError::Auth(_) => ErrorKind::AuthError,
            FacilitatorError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            FacilitatorError::ServerFault(_) => ErrorKind::ServerFault,
        }
    }
}

/// Terminal outcome of a dispatch that produced no usable reply.
#[derive(Debug, Clone, Error)]
pub enum FailoverError {
    /// No enabled facilitator was available; nothing was attempted.
    #[error("all facilitators unavailable: no enabled facilitators")]
    NoFacilitators,

    /// Health-aware ordering excluded every enabled facilitator.
    #[error("no healthy facilitator available")]
    NoHealthyFacilitator,

    /// Every candidate failed and the last one failed with an error.
    #[error("all {} facilitators failed", .details.len())]
    AllFailed { details: Vec<FailureDetail> },

    /// The last candidate answered with a server fault. The reply is kept
    /// as-is so its diagnostics reach the caller.
    #[error("last facilitator returned HTTP {}", .reply.status)]
    UpstreamFault {
        reply: FacilitatorReply,
        details: Vec<FailureDetail>,
    },
}

impl FailoverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FailoverError::NoFacilitators | FailoverError::AllFailed { .. } => ErrorKind::AllFailed,
            FailoverError::NoHealthyFacilitator => ErrorKind::NoHealthyFacilitator,
            FailoverError::UpstreamFault { .. } => ErrorKind::ServerFault,
        }
    }

    /// Per-facilitator failures in attempt order.
    pub fn details(&self) -> &[FailureDetail] {
        match self {
            FailoverError::NoFacilitators | FailoverError::NoHealthyFacilitator => &[],
            FailoverError::AllFailed { details } => details,
            FailoverError::UpstreamFault { details, .. } => details,
        }
    }
}

/// Fatal configuration problems detected while building the failover context.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("at least one facilitator must be configured")]
    Empty,

    #[error("facilitator '{0}' has an empty id")]
    EmptyId(String),

    #[error("facilitator '{0}' has a zero timeout")]
    ZeroTimeout(String),

    #[error("facilitator '{id}' has an invalid endpoint: {reason}")]
    InvalidEndpoint { id: String, reason: String },

    #[error("invalid failover settings: {0}")]
    Settings(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("invalid price '{0}': no numeric content")]
    Empty(String),

    #[error("invalid price '{price}': {reason}")]
    Malformed { price: String, reason: String },

    #[error("invalid price '{0}': overflow")]
    Overflow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(FacilitatorError::Timeout(5000).kind().as_str(), "TIMEOUT");
        assert_eq!(
            FacilitatorError::Network("refused".into()).kind().as_str(),
            "NETWORK_ERROR"
        );
        assert_eq!(FailoverError::NoFacilitators.kind().as_str(), "ALL_FAILED");
        assert_eq!(
            FailoverError::NoHealthyFacilitator.kind().as_str(),
            "NO_HEALTHY_FACILITATOR"
        );
    }

    #[test]
    fn test_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::InvalidResponse).unwrap();
        assert_eq!(json, "\"INVALID_RESPONSE\"");
    }

    #[test]
    fn test_timeout_message_matches_detail_format() {
        assert_eq!(FacilitatorError::Timeout(250).to_string(), "Timeout after 250ms");
        assert_eq!(FacilitatorError::ServerFault(502).to_string(), "HTTP 502");
    }
}

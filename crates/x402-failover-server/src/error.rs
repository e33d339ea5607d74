use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use x402_failover::{FailoverError, UnavailableResponse, RETRY_AFTER_SECS};

#[derive(Debug)]
pub enum ServerError {
    /// Dispatch through the facilitator pool failed
    Failover(FailoverError),
    /// Payment header was not base64 JSON
    InvalidPaymentHeader(String),
    /// A facilitator answered with a body we could not interpret
    BadFacilitatorReply(String),
    /// Unknown facilitator id in a status action
    FacilitatorNotFound(String),
    /// Missing or wrong bearer token
    Unauthorized,
    /// Internal error
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Failover(e) => write!(f, "{e}"),
            ServerError::InvalidPaymentHeader(msg) => write!(f, "invalid payment header: {msg}"),
            ServerError::BadFacilitatorReply(msg) => write!(f, "bad facilitator reply: {msg}"),
            ServerError::FacilitatorNotFound(id) => write!(f, "facilitator not found: {id}"),
            ServerError::Unauthorized => write!(f, "unauthorized"),
            ServerError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<FailoverError> for ServerError {
    fn from(e: FailoverError) -> Self {
        ServerError::Failover(e)
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Failover(FailoverError::UpstreamFault { reply, .. }) => {
                StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ServerError::Failover(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidPaymentHeader(_) => StatusCode::BAD_REQUEST,
            ServerError::BadFacilitatorReply(_) => StatusCode::BAD_GATEWAY,
            ServerError::FacilitatorNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ServerError::Failover(FailoverError::UpstreamFault { reply, details }) => {
                tracing::error!(
                    status = reply.status,
                    failures = details.len(),
                    "Replaying upstream facilitator fault"
                );
                HttpResponse::build(self.status_code()).json(&reply.body)
            }
            ServerError::Failover(e) => {
                tracing::error!(kind = e.kind().as_str(), error = %e, "Facilitator dispatch failed");
                HttpResponse::ServiceUnavailable()
                    .insert_header(("Retry-After", RETRY_AFTER_SECS.to_string()))
                    .json(UnavailableResponse::new(e.details().to_vec()))
            }
            ServerError::InvalidPaymentHeader(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid_payment_header",
                    "message": msg
                }))
            }
            ServerError::BadFacilitatorReply(msg) => {
                tracing::error!("Bad facilitator reply: {}", msg);
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "bad_facilitator_reply",
                    "message": "Payment facilitator returned an unreadable response"
                }))
            }
            ServerError::FacilitatorNotFound(id) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "facilitator_not_found",
                "message": format!("Facilitator '{id}' not found")
            })),
            ServerError::Unauthorized => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "unauthorized",
                "message": "Valid Bearer token required"
            })),
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}

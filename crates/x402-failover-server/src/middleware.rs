use actix_web::{HttpRequest, HttpResponse, ResponseError};
use base64::Engine;
use x402_failover::{
    Dispatched, Failover, FacilitatorReply, PaymentRequest, PaymentRequiredBody,
    PaymentRequirements, SettleResponse, VerifyResponse, X402_VERSION,
};

use crate::config::RoutePaymentConfig;
use crate::error::ServerError;
use crate::metrics::PAYMENTS;

/// Header carrying the client's payment, base64-encoded JSON.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";
/// Newer clients send the payment under this name instead.
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";
/// Header carrying the settlement result back to the client.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Build a 402 Payment Required HTTP response
pub fn payment_required_response(requirements: &PaymentRequirements, error: &str) -> HttpResponse {
    HttpResponse::PaymentRequired().json(PaymentRequiredBody {
        x402_version: X402_VERSION,
        error: error.to_string(),
        accepts: vec![requirements.clone()],
    })
}

/// Extract and decode the payment header. `Ok(None)` when no header is present.
pub fn extract_payment_header(req: &HttpRequest) -> Result<Option<serde_json::Value>, ServerError> {
    let Some(header) = req
        .headers()
        .get(PAYMENT_HEADER)
        .or_else(|| req.headers().get(PAYMENT_SIGNATURE_HEADER))
    else {
        return Ok(None);
    };

    let encoded = header
        .to_str()
        .map_err(|_| ServerError::InvalidPaymentHeader("header is not ASCII".to_string()))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ServerError::InvalidPaymentHeader(format!("not base64: {e}")))?;
    let payload: serde_json::Value = serde_json::from_slice(&decoded)
        .map_err(|e| ServerError::InvalidPaymentHeader(format!("not JSON: {e}")))?;

    if !payload.is_object() {
        return Err(ServerError::InvalidPaymentHeader(
            "payload must be a JSON object".to_string(),
        ));
    }
    Ok(Some(payload))
}

/// Verify and settle the request's payment through the facilitator pool.
///
/// On `Err` the response is ready to return to the client: 402 for a missing
/// or rejected payment, 503 when every facilitator is down, or the upstream
/// status when the last facilitator faulted.
pub async fn require_payment(
    req: &HttpRequest,
    route: &RoutePaymentConfig,
    failover: &Failover,
) -> Result<SettleResponse, HttpResponse> {
    let requirements = &route.requirements;

    let payload = match extract_payment_header(req) {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            PAYMENTS.with_label_values(&["required"]).inc();
            return Err(payment_required_response(
                requirements,
                "X-PAYMENT header is required",
            ));
        }
        Err(e) => {
            PAYMENTS.with_label_values(&["rejected"]).inc();
            return Err(e.error_response());
        }
    };

    let x402_version = payload
        .get("x402Version")
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(X402_VERSION);
    let request = PaymentRequest {
        x402_version,
        payment_payload: payload,
        payment_requirements: requirements.clone(),
    };

    let verified = dispatch_result(failover.verify(request.clone()).await)?;
    if let Some(reason) = rejection(&verified.reply) {
        return Err(reject(requirements, &reason));
    }
    let verify: VerifyResponse = verified.reply.parse().map_err(|e| {
        PAYMENTS.with_label_values(&["unavailable"]).inc();
        ServerError::BadFacilitatorReply(e.to_string()).error_response()
    })?;
    if !verify.is_valid {
        let reason = verify
            .invalid_reason
            .unwrap_or_else(|| "payment verification failed".to_string());
        return Err(reject(requirements, &reason));
    }

    let settled = dispatch_result(failover.settle(request).await)?;
    if let Some(reason) = rejection(&settled.reply) {
        return Err(reject(requirements, &reason));
    }
    let settle: SettleResponse = settled.reply.parse().map_err(|e| {
        PAYMENTS.with_label_values(&["unavailable"]).inc();
        ServerError::BadFacilitatorReply(e.to_string()).error_response()
    })?;
    if !settle.success {
        let reason = settle
            .error_reason
            .unwrap_or_else(|| "settlement failed".to_string());
        return Err(reject(requirements, &reason));
    }

    PAYMENTS.with_label_values(&["settled"]).inc();
    tracing::info!(
        resource = %requirements.resource,
        facilitator = %settled.facilitator_name,
        transaction = settle.transaction.as_deref().unwrap_or("-"),
        "Payment settled"
    );
    Ok(settle)
}

fn dispatch_result(
    result: Result<Dispatched, x402_failover::FailoverError>,
) -> Result<Dispatched, HttpResponse> {
    result.map_err(|e| {
        PAYMENTS.with_label_values(&["unavailable"]).inc();
        ServerError::from(e).error_response()
    })
}

/// A non-2xx reply that was not a server fault is the facilitator refusing the payment.
fn rejection(reply: &FacilitatorReply) -> Option<String> {
    if reply.is_success() {
        return None;
    }
    let reason = ["invalidReason", "errorReason", "error", "message"]
        .iter()
        .find_map(|key| reply.body.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", reply.status));
    Some(reason)
}

fn reject(requirements: &PaymentRequirements, reason: &str) -> HttpResponse {
    PAYMENTS.with_label_values(&["rejected"]).inc();
    tracing::warn!(resource = %requirements.resource, reason, "Payment rejected");
    payment_required_response(requirements, reason)
}

/// Value of the `X-PAYMENT-RESPONSE` header: base64 of the settle response JSON.
pub fn payment_response_header(settle: &SettleResponse) -> String {
    let json = serde_json::to_vec(settle).unwrap_or_default();
    base64::engine::general_purpose::STANDARD.encode(json)
}

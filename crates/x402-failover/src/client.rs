//! HTTP implementation of [`FacilitatorClient`] for remote x402 facilitators.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;

use crate::auth::{sign_body, SIGNATURE_HEADER};
use crate::constants::DEFAULT_TIMEOUT_MS;
use crate::error::FacilitatorError;
use crate::facilitator::{Credentials, FacilitatorClient, FacilitatorDescriptor, FacilitatorReply};
use crate::payment::PaymentRequest;

/// Calls a facilitator's `/verify`, `/settle`, `/supported` and
/// `/discovery/resources` endpoints.
pub struct HttpFacilitatorClient {
    http: reqwest::Client,
    base: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl HttpFacilitatorClient {
    /// Build a client for one descriptor. The `reqwest::Client` is shared
    /// across facilitators so connection pools are reused.
    pub fn new(http: reqwest::Client, descriptor: &FacilitatorDescriptor) -> Self {
        Self {
            http,
            base: descriptor.endpoint.as_str().trim_end_matches('/').to_string(),
            credentials: descriptor.credentials.clone(),
            timeout: descriptor
                .timeout
                .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder, body: &[u8]) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(Credentials::Bearer(key)) => request.bearer_auth(key),
            Some(Credentials::SharedSecret(secret)) => {
                request.header(SIGNATURE_HEADER, sign_body(secret, body))
            }
            None => request,
        }
    }

    async fn post(
        &self,
        path: &str,
        request: &PaymentRequest,
    ) -> Result<FacilitatorReply, FacilitatorError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| FacilitatorError::InvalidResponse(format!("serialization failed: {e}")))?;
        let builder = self
            .http
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(self.timeout);
        let builder = self.authorize(builder, &body).body(body);
        self.send(builder).await
    }

    async fn get(&self, path: &str) -> Result<FacilitatorReply, FacilitatorError> {
        let builder = self.http.get(self.url(path)).timeout(self.timeout);
        let builder = self.authorize(builder, b"");
        self.send(builder).await
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<FacilitatorReply, FacilitatorError> {
        let resp = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FacilitatorError::Auth(format!(
                "facilitator rejected credentials (HTTP {})",
                status.as_u16()
            )));
        }

        let bytes = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        let body = decode_body(status, &bytes)?;
        Ok(FacilitatorReply::new(status.as_u16(), body))
    }

    fn transport_error(&self, e: reqwest::Error) -> FacilitatorError {
        if e.is_timeout() {
            FacilitatorError::Timeout(self.timeout.as_millis() as u64)
        } else if e.is_decode() {
            FacilitatorError::InvalidResponse(e.to_string())
        } else {
            FacilitatorError::Network(e.to_string())
        }
    }
}

/// Parse a reply body. Server faults may carry plain text, which is kept as a string.
fn decode_body(status: StatusCode, bytes: &[u8]) -> Result<serde_json::Value, FacilitatorError> {
    if bytes.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(_) if status.is_server_error() => Ok(serde_json::Value::String(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        Err(e) => Err(FacilitatorError::InvalidResponse(format!(
            "HTTP {} body is not JSON: {e}",
            status.as_u16()
        ))),
    }
}

impl FacilitatorClient for HttpFacilitatorClient {
    fn verify<'a>(
        &'a self,
        request: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>> {
        self.post("verify", request).boxed()
    }

    fn settle<'a>(
        &'a self,
        request: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>> {
        self.post("settle", request).boxed()
    }

    fn supported(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>> {
        self.get("supported").boxed()
    }

    fn list(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>> {
        self.get("discovery/resources").boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn client_for(endpoint: &str) -> HttpFacilitatorClient {
        let descriptor =
            FacilitatorDescriptor::new("t", "T", 1, Url::parse(endpoint).unwrap());
        HttpFacilitatorClient::new(reqwest::Client::new(), &descriptor)
    }

    #[test]
    fn test_url_joining_strips_trailing_slash() {
        let client = client_for("https://facilitator.payai.network/");
        assert_eq!(
            client.url("verify"),
            "https://facilitator.payai.network/verify"
        );
        assert_eq!(
            client.url("discovery/resources"),
            "https://facilitator.payai.network/discovery/resources"
        );
    }

    #[test]
    fn test_default_timeout_applies() {
        let client = client_for("https://facilitator.x402.rs");
        assert_eq!(client.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(
            decode_body(StatusCode::OK, b"").unwrap(),
            serde_json::Value::Null
        );
        assert_eq!(
            decode_body(StatusCode::OK, br#"{"isValid":true}"#).unwrap()["isValid"],
            true
        );
        assert_eq!(
            decode_body(StatusCode::BAD_GATEWAY, b"upstream down").unwrap(),
            serde_json::Value::String("upstream down".to_string())
        );
        assert!(matches!(
            decode_body(StatusCode::OK, b"<html>"),
            Err(FacilitatorError::InvalidResponse(_))
        ));
    }
}

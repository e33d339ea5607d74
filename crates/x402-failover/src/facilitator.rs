//! Facilitator descriptors, the remote-capability trait, and the runtime
//! handle the registry hands out.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FacilitatorError;
use crate::payment::PaymentRequest;

/// Credential material attached to every call to one facilitator.
#[derive(Clone)]
pub enum Credentials {
    /// Sent as `Authorization: Bearer <key>`.
    Bearer(String),
    /// HMAC-SHA256 over the request body, sent as `X-Facilitator-Auth`.
    SharedSecret(Vec<u8>),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Credentials::SharedSecret(_) => f.write_str("SharedSecret([REDACTED])"),
        }
    }
}

/// Static description of one facilitator, built once from configuration.
#[derive(Debug, Clone)]
pub struct FacilitatorDescriptor {
    pub id: String,
    pub name: String,
    /// Lower is tried first. Ties keep configuration order.
    pub priority: i64,
    /// Per-attempt bound. `None` falls back to the global default.
    pub timeout: Option<Duration>,
    pub endpoint: Url,
    pub credentials: Option<Credentials>,
    /// Initial value of the runtime `enabled` flag.
    pub enabled: bool,
}

impl FacilitatorDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: i64, endpoint: Url) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            timeout: None,
            endpoint,
            credentials: None,
            enabled: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Kind of facilitator interaction, as recorded in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Verify,
    Settle,
    Supported,
    List,
    HealthCheck,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Verify => "verify",
            Operation::Settle => "settle",
            Operation::Supported => "supported",
            Operation::List => "list",
            Operation::HealthCheck => "health-check",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A facilitator's HTTP-level answer: status plus JSON body.
///
/// 4xx replies are answers, not failures; only 5xx replies trigger failover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilitatorReply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl FacilitatorReply {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(200, body)
    }

    pub fn is_server_fault(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body into a typed response.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, FacilitatorError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| FacilitatorError::InvalidResponse(format!("unexpected body: {e}")))
    }
}

/// The remote capability a facilitator exposes.
///
/// Implementations return replies for any HTTP status they receive and
/// reserve `Err` for calls that produced no usable reply at all.
pub trait FacilitatorClient: Send + Sync {
    fn verify<'a>(
        &'a self,
        request: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>>;

    fn settle<'a>(
        &'a self,
        request: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>>;

    /// Capability discovery. Cheap and side-effect free, so it doubles as the health probe.
    fn supported(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>>;

    fn list(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>>;
}

/// One call to route through the dispatcher.
#[derive(Debug, Clone)]
pub enum FacilitatorCall {
    Verify(PaymentRequest),
    Settle(PaymentRequest),
    Supported,
    List,
}

impl FacilitatorCall {
    pub fn operation(&self) -> Operation {
        match self {
            FacilitatorCall::Verify(_) => Operation::Verify,
            FacilitatorCall::Settle(_) => Operation::Settle,
            FacilitatorCall::Supported => Operation::Supported,
            FacilitatorCall::List => Operation::List,
        }
    }

    pub(crate) fn invoke<'a>(
        &'a self,
        client: &'a dyn FacilitatorClient,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>> {
        match self {
            FacilitatorCall::Verify(request) => client.verify(request),
            FacilitatorCall::Settle(request) => client.settle(request),
            FacilitatorCall::Supported => client.supported(),
            FacilitatorCall::List => client.list(),
        }
    }
}

/// A registered facilitator: its descriptor, runtime `enabled` flag and client.
pub struct Facilitator {
    descriptor: FacilitatorDescriptor,
    enabled: AtomicBool,
    client: Arc<dyn FacilitatorClient>,
}

impl Facilitator {
    pub fn new(descriptor: FacilitatorDescriptor, client: Arc<dyn FacilitatorClient>) -> Self {
        let enabled = AtomicBool::new(descriptor.enabled);
        Self {
            descriptor,
            enabled,
            client,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn priority(&self) -> i64 {
        self.descriptor.priority
    }

    pub fn descriptor(&self) -> &FacilitatorDescriptor {
        &self.descriptor
    }

    /// Effective per-attempt timeout.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.descriptor.timeout.unwrap_or(default)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn client(&self) -> &dyn FacilitatorClient {
        self.client.as_ref()
    }
}

impl fmt::Debug for Facilitator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facilitator")
            .field("descriptor", &self.descriptor)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

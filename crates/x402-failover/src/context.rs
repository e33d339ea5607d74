//! The composed failover context.
//!
//! [`Failover`] owns the registry, operation log, health monitor and
//! dispatcher for one set of facilitators. Nothing here is process-global,
//! so independent instances can coexist (one per test, for example).

use std::sync::Arc;

use crate::client::HttpFacilitatorClient;
use crate::dispatcher::{Dispatched, Dispatcher};
use crate::error::{FailoverError, RegistryError};
use crate::facilitator::{FacilitatorCall, FacilitatorClient, FacilitatorDescriptor};
use crate::health::HealthMonitor;
use crate::logger::OperationLog;
use crate::payment::PaymentRequest;
use crate::registry::FacilitatorRegistry;
use crate::settings::FailoverSettings;

pub struct Failover {
    settings: FailoverSettings,
    registry: Arc<FacilitatorRegistry>,
    log: Arc<OperationLog>,
    health: Arc<HealthMonitor>,
    dispatcher: Dispatcher,
}

impl Failover {
    /// Build a context that talks to each facilitator over HTTP.
    pub fn new(
        settings: FailoverSettings,
        descriptors: Vec<FacilitatorDescriptor>,
    ) -> Result<Self, RegistryError> {
        let http = reqwest::Client::new();
        let entries = descriptors
            .into_iter()
            .map(|descriptor| {
                let client: Arc<dyn FacilitatorClient> =
                    Arc::new(HttpFacilitatorClient::new(http.clone(), &descriptor));
                (descriptor, client)
            })
            .collect();
        Self::with_clients(settings, entries)
    }

    /// Build a context from descriptors paired with arbitrary clients.
    pub fn with_clients(
        settings: FailoverSettings,
        entries: Vec<(FacilitatorDescriptor, Arc<dyn FacilitatorClient>)>,
    ) -> Result<Self, RegistryError> {
        settings.validate().map_err(RegistryError::Settings)?;

        let registry = Arc::new(FacilitatorRegistry::new(entries)?);
        let log = Arc::new(OperationLog::new(
            settings.logging.clone(),
            registry.all().iter().map(|f| (f.id(), f.name())),
        ));
        let health = Arc::new(HealthMonitor::new(
            settings.health_check.clone(),
            Arc::clone(&registry),
            Arc::clone(&log),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&log),
            Arc::clone(&health),
            settings.default_timeout,
            settings.retries_per_facilitator,
            settings.ordering,
        );

        tracing::info!(
            facilitators = registry.len(),
            ordering = ?settings.ordering,
            "Failover context ready"
        );
        for facilitator in registry.all() {
            tracing::info!(
                facilitator = %facilitator.id(),
                name = %facilitator.name(),
                priority = facilitator.priority(),
                enabled = facilitator.is_enabled(),
                "Facilitator registered"
            );
        }

        Ok(Self {
            settings,
            registry,
            log,
            health,
            dispatcher,
        })
    }

    /// Start background health probing. Idempotent.
    pub fn start(&self) {
        self.health.start();
    }

    /// Stop background probing. Call before the process exits.
    pub fn shutdown(&self) {
        self.health.stop();
    }

    pub async fn dispatch(&self, call: &FacilitatorCall) -> Result<Dispatched, FailoverError> {
        self.dispatcher.dispatch(call).await
    }

    pub async fn verify(&self, request: PaymentRequest) -> Result<Dispatched, FailoverError> {
        self.dispatch(&FacilitatorCall::Verify(request)).await
    }

    pub async fn settle(&self, request: PaymentRequest) -> Result<Dispatched, FailoverError> {
        self.dispatch(&FacilitatorCall::Settle(request)).await
    }

    pub async fn supported(&self) -> Result<Dispatched, FailoverError> {
        self.dispatch(&FacilitatorCall::Supported).await
    }

    pub async fn list(&self) -> Result<Dispatched, FailoverError> {
        self.dispatch(&FacilitatorCall::List).await
    }

    pub fn settings(&self) -> &FailoverSettings {
        &self.settings
    }

    pub fn registry(&self) -> &FacilitatorRegistry {
        &self.registry
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{descriptor, entry, MockClient};
    use std::time::Duration;

    #[test]
    fn test_invalid_settings_abort_construction() {
        let settings = FailoverSettings {
            default_timeout: Duration::ZERO,
            ..Default::default()
        };
        let result = Failover::with_clients(settings, vec![entry("a", 1, MockClient::ok())]);
        assert!(matches!(result, Err(RegistryError::Settings(_))));
    }

    #[test]
    fn test_empty_descriptor_list_aborts() {
        let result = Failover::new(FailoverSettings::default(), Vec::new());
        assert!(matches!(result, Err(RegistryError::Empty)));
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let one = Failover::with_clients(
            FailoverSettings::default(),
            vec![entry("a", 1, MockClient::ok())],
        )
        .unwrap();
        let two = Failover::with_clients(
            FailoverSettings::default(),
            vec![entry("a", 1, MockClient::ok())],
        )
        .unwrap();

        one.supported().await.unwrap();
        assert_eq!(one.log().stats("a").unwrap().operations.supported, 1);
        assert_eq!(two.log().stats("a").unwrap().operations.supported, 0);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let client = MockClient::ok();
        let failover = Failover::with_clients(
            FailoverSettings::default(),
            vec![entry("a", 1, client.clone())],
        )
        .unwrap();
        failover.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.calls(), 1);
        assert!(failover.health().is_running());
        failover.shutdown();
        assert!(!failover.health().is_running());
    }

    #[test]
    fn test_http_clients_built_from_descriptors() {
        let failover = Failover::new(
            FailoverSettings::default(),
            vec![descriptor("a", 2), descriptor("b", 1)],
        )
        .unwrap();
        let ids: Vec<_> = failover.registry().all().iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}

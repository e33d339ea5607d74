use crate::config::{ConfigError, PaymentConfig, ServerConfig};
use std::sync::Arc;
use x402_failover::Failover;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub failover: Arc<Failover>,
    /// Priced routes
    pub payments: Arc<PaymentConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, failover: Failover) -> Result<Self, ConfigError> {
        let payments = PaymentConfig::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            failover: Arc::new(failover),
            payments: Arc::new(payments),
        })
    }
}

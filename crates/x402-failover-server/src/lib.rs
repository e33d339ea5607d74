//! HTTP server for the x402 facilitator failover core.
//!
//! Priced routes are gated behind x402 payments whose verification and
//! settlement go through [`x402_failover::Failover`]; operators inspect the
//! pool at `/facilitator-status`.

pub mod config;
pub mod cors;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ConfigError, PaymentConfig, ServerConfig};
pub use error::ServerError;
pub use state::AppState;

//! Facilitator failover for x402 pay-per-request gateways.
//!
//! A gateway that depends on one payment facilitator inherits its outages.
//! This crate spreads verification and settlement across several:
//!
//! - **Dispatcher** ([`Dispatcher`]): tries facilitators in priority order,
//!   bounds each attempt by a timeout and fails over on errors or 5xx replies
//! - **Health monitor** ([`HealthMonitor`]): probes each facilitator's
//!   `/supported` endpoint on an interval and keeps a healthy/unhealthy verdict
//! - **Operation log** ([`OperationLog`]): bounded in-memory record of every
//!   attempt, with per-facilitator statistics
//!
//! [`Failover`] composes all three around a [`FacilitatorRegistry`].
//!
//! # Quick example
//!
//! ```no_run
//! use x402_failover::{FacilitatorDescriptor, Failover, FailoverSettings};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let descriptors = vec![
//!     FacilitatorDescriptor::new("x402-rs", "X402 RS", 1, "https://facilitator.x402.rs".parse().unwrap()),
//!     FacilitatorDescriptor::new("payai-network", "PayAI Network", 2, "https://facilitator.payai.network".parse().unwrap()),
//! ];
//! let failover = Failover::new(FailoverSettings::default(), descriptors).unwrap();
//! failover.start();
//!
//! let kinds = failover.supported().await.unwrap();
//! println!("{} answered: {}", kinds.facilitator_name, kinds.reply.body);
//!
//! failover.shutdown();
//! # }
//! ```

// Data model and protocol types
pub mod constants;
pub mod error;
pub mod facilitator;
pub mod payment;
pub mod price;
pub mod response;
pub mod settings;

// Failover machinery
pub mod context;
pub mod dispatcher;
pub mod health;
pub mod logger;
pub mod registry;

// Transport, auth and observability
pub mod auth;
pub mod client;
pub mod metrics;

#[cfg(test)]
mod test_support;

pub use constants::*;
pub use context::Failover;
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{ErrorKind, FacilitatorError, FailoverError, PriceError, RegistryError};
pub use facilitator::{
    Credentials, Facilitator, FacilitatorCall, FacilitatorClient, FacilitatorDescriptor,
    FacilitatorReply, Operation,
};
pub use health::{HealthMonitor, HealthRecord, HealthSummary};
pub use logger::{LogEntry, LogFilter, OperationLog, OverallSummary, StatsRecord, WindowMetrics};
pub use payment::*;
pub use price::parse_price;
pub use registry::FacilitatorRegistry;
pub use response::*;
pub use settings::{DispatchOrdering, FailoverSettings, HealthCheckSettings, LogSettings};

pub use client::HttpFacilitatorClient;

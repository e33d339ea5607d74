//! Priority-ordered failover across facilitators.
//!
//! Candidates are tried strictly one at a time. Each attempt is bounded by
//! the facilitator's timeout; on expiry the local wait stops, though the
//! remote side may still finish the work. Every attempt is written to the
//! [`OperationLog`]. Health records are read (for the opt-in orderings) but
//! never written here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::constants::{ALL_FACILITATORS_ID, NO_FACILITATOR_ID};
use crate::error::{FacilitatorError, FailoverError};
use crate::facilitator::{Facilitator, FacilitatorCall, FacilitatorReply, Operation};
use crate::health::HealthMonitor;
use crate::logger::OperationLog;
use crate::metrics;
use crate::registry::FacilitatorRegistry;
use crate::response::FailureDetail;
use crate::settings::DispatchOrdering;

/// A facilitator reply that ended a dispatch, with how it was reached.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub reply: FacilitatorReply,
    pub facilitator_id: String,
    pub facilitator_name: String,
    pub dispatch_id: Uuid,
    /// Attempts made across all facilitators, including the successful one.
    pub attempts: u32,
    /// One entry per facilitator that failed before this one answered.
    pub failures: Vec<FailureDetail>,
    pub elapsed: Duration,
}

/// Result of a single bounded attempt.
enum Attempt {
    Answered(FacilitatorReply),
    Faulted(FacilitatorReply),
    Failed(FacilitatorError),
}

pub struct Dispatcher {
    registry: Arc<FacilitatorRegistry>,
    log: Arc<OperationLog>,
    health: Arc<HealthMonitor>,
    default_timeout: Duration,
    retries: u32,
    ordering: DispatchOrdering,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<FacilitatorRegistry>,
        log: Arc<OperationLog>,
        health: Arc<HealthMonitor>,
        default_timeout: Duration,
        retries_per_facilitator: u32,
        ordering: DispatchOrdering,
    ) -> Self {
        Self {
            registry,
            log,
            health,
            default_timeout,
            retries: retries_per_facilitator.max(1),
            ordering,
        }
    }

    /// Route `call` to the first facilitator that produces a non-5xx reply.
    pub async fn dispatch(&self, call: &FacilitatorCall) -> Result<Dispatched, FailoverError> {
        let operation = call.operation();
        let dispatch_id = Uuid::new_v4();
        let started = Instant::now();

        let candidates = match self.candidates() {
            Ok(candidates) => candidates,
            Err(e) => return self.exhausted(operation, dispatch_id, started, e),
        };

        let mut attempts = 0u32;
        let mut failures = Vec::new();
        let mut last_fault = None;

        for facilitator in &candidates {
            // Toggles made while this dispatch is running take effect here.
            if !facilitator.is_enabled() {
                continue;
            }
            last_fault = None;
            let mut last_error = String::new();

            for _ in 0..self.retries {
                attempts += 1;
                match self
                    .attempt(call, facilitator, dispatch_id, attempts)
                    .await
                {
                    Attempt::Answered(reply) => {
                        let elapsed = started.elapsed();
                        if !failures.is_empty() {
                            tracing::info!(
                                facilitator = %facilitator.id(),
                                operation = %operation,
                                attempts,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "Failover succeeded"
                            );
                        }
                        return Ok(Dispatched {
                            reply,
                            facilitator_id: facilitator.id().to_string(),
                            facilitator_name: facilitator.name().to_string(),
                            dispatch_id,
                            attempts,
                            failures,
                            elapsed,
                        });
                    }
                    Attempt::Faulted(reply) => {
                        last_error = FacilitatorError::ServerFault(reply.status).to_string();
                        last_fault = Some(reply);
                        break;
                    }
                    Attempt::Failed(e) => last_error = e.to_string(),
                }
            }

            failures.push(FailureDetail {
                facilitator: facilitator.name().to_string(),
                error: last_error,
            });
        }

        if attempts == 0 {
            return self.exhausted(operation, dispatch_id, started, FailoverError::NoFacilitators);
        }

        let error = match last_fault {
            Some(reply) => FailoverError::UpstreamFault {
                reply,
                details: failures,
            },
            None => FailoverError::AllFailed { details: failures },
        };
        self.exhausted(operation, dispatch_id, started, error)
    }

    /// Enabled facilitators in the order this dispatcher will try them.
    fn candidates(&self) -> Result<Vec<Arc<Facilitator>>, FailoverError> {
        let enabled: Vec<Arc<Facilitator>> = self.registry.enabled().cloned().collect();
        if enabled.is_empty() {
            return Err(FailoverError::NoFacilitators);
        }

        match self.ordering {
            DispatchOrdering::Priority => Ok(enabled),
            DispatchOrdering::HealthyFirst => {
                let (healthy, unhealthy): (Vec<_>, Vec<_>) = enabled
                    .into_iter()
                    .partition(|f| self.health.is_healthy(f.id()));
                Ok(healthy.into_iter().chain(unhealthy).collect())
            }
            DispatchOrdering::HealthyOnly => {
                let healthy: Vec<_> = enabled
                    .into_iter()
                    .filter(|f| self.health.is_healthy(f.id()))
                    .collect();
                if healthy.is_empty() {
                    Err(FailoverError::NoHealthyFacilitator)
                } else {
                    Ok(healthy)
                }
            }
        }
    }

    async fn attempt(
        &self,
        call: &FacilitatorCall,
        facilitator: &Facilitator,
        dispatch_id: Uuid,
        attempt: u32,
    ) -> Attempt {
        let operation = call.operation();
        let timeout = facilitator.timeout_or(self.default_timeout);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(timeout, call.invoke(facilitator.client())).await {
            Ok(Ok(reply)) if reply.is_server_fault() => Attempt::Faulted(reply),
            Ok(Ok(reply)) => Attempt::Answered(reply),
            Ok(Err(e)) => Attempt::Failed(e),
            Err(_) => Attempt::Failed(FacilitatorError::Timeout(timeout.as_millis() as u64)),
        };
        let elapsed = started.elapsed();

        metrics::ATTEMPT_LATENCY
            .with_label_values(&[facilitator.id(), operation.as_str()])
            .observe(elapsed.as_secs_f64());

        let ctx = Some(context(dispatch_id, attempt));
        let result = match &outcome {
            Attempt::Answered(_) => {
                self.log
                    .log_success(operation, facilitator.id(), facilitator.name(), elapsed, ctx);
                "success"
            }
            Attempt::Faulted(reply) => {
                let error = FacilitatorError::ServerFault(reply.status).to_string();
                self.log
                    .log_error(operation, facilitator.id(), facilitator.name(), &error, elapsed, ctx);
                "server_fault"
            }
            Attempt::Failed(e) => {
                self.log.log_error(
                    operation,
                    facilitator.id(),
                    facilitator.name(),
                    &e.to_string(),
                    elapsed,
                    ctx,
                );
                match e {
                    FacilitatorError::Timeout(_) => "timeout",
                    _ => "error",
                }
            }
        };
        metrics::ATTEMPTS
            .with_label_values(&[facilitator.id(), operation.as_str(), result])
            .inc();

        outcome
    }

    fn exhausted(
        &self,
        operation: Operation,
        dispatch_id: Uuid,
        started: Instant,
        error: FailoverError,
    ) -> Result<Dispatched, FailoverError> {
        let id = match error {
            FailoverError::NoFacilitators | FailoverError::NoHealthyFacilitator => NO_FACILITATOR_ID,
            _ => ALL_FACILITATORS_ID,
        };
        self.log.log_error(
            operation,
            id,
            id,
            &error.to_string(),
            started.elapsed(),
            Some(context(dispatch_id, 0)),
        );
        metrics::EXHAUSTED
            .with_label_values(&[operation.as_str(), error.kind().as_str()])
            .inc();
        Err(error)
    }
}

fn context(dispatch_id: Uuid, attempt: u32) -> Map<String, Value> {
    let mut ctx = Map::new();
    ctx.insert("dispatchId".to_string(), json!(dispatch_id.to_string()));
    ctx.insert("attempt".to_string(), json!(attempt));
    ctx
}

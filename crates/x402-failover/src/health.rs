//! Background health probing.
//!
//! The monitor calls every enabled facilitator's `supported` endpoint on a
//! fixed interval, bounded by the probe timeout, and keeps one
//! [`HealthRecord`] per facilitator. It never consults dispatch outcomes;
//! the dispatcher's own failures go to the [`OperationLog`] instead.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::FacilitatorError;
use crate::facilitator::{Facilitator, Operation};
use crate::logger::{moving_average, success_rate, OperationLog};
use crate::metrics;
use crate::registry::FacilitatorRegistry;
use crate::settings::HealthCheckSettings;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub facilitator_id: String,
    pub is_healthy: bool,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub average_response_time_ms: Option<f64>,
    pub last_successful_check: Option<DateTime<Utc>>,
    pub last_failed_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl HealthRecord {
    fn new(id: &str) -> Self {
        Self {
            facilitator_id: id.to_string(),
            is_healthy: true,
            consecutive_failures: 0,
            total_successes: 0,
            total_failures: 0,
            average_response_time_ms: None,
            last_successful_check: None,
            last_failed_check: None,
            last_error: None,
        }
    }

    pub fn success_rate(&self) -> Option<f64> {
        success_rate(self.total_successes, self.total_failures)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    pub average_response_time_ms: Option<f64>,
}

pub struct HealthMonitor {
    settings: HealthCheckSettings,
    registry: Arc<FacilitatorRegistry>,
    log: Arc<OperationLog>,
    records: DashMap<String, HealthRecord>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// One healthy record is created per registered facilitator.
    pub fn new(
        settings: HealthCheckSettings,
        registry: Arc<FacilitatorRegistry>,
        log: Arc<OperationLog>,
    ) -> Self {
        let records = DashMap::new();
        for facilitator in registry.all() {
            records.insert(facilitator.id().to_string(), HealthRecord::new(facilitator.id()));
            metrics::FACILITATOR_HEALTHY
                .with_label_values(&[facilitator.id()])
                .set(1);
        }
        Self {
            settings,
            registry,
            log,
            records,
            task: Mutex::new(None),
        }
    }

    /// Spawn the probe loop. The first round runs immediately.
    ///
    /// No-op when probing is disabled or the loop is already running.
    pub fn start(self: &Arc<Self>) {
        if !self.settings.enabled {
            tracing::info!("Facilitator health checks disabled");
            return;
        }
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let monitor = Arc::clone(self);
        let period = self.settings.interval;
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                monitor.check_all().await;
            }
        }));

        tracing::info!(
            interval_ms = period.as_millis() as u64,
            probe_timeout_ms = self.settings.probe_timeout.as_millis() as u64,
            facilitators = self.registry.len(),
            "Facilitator health monitor started"
        );
    }

    /// Cancel the probe loop. Probes already in flight are abandoned.
    pub fn stop(&self) {
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("Facilitator health monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Probe every enabled facilitator concurrently and return the refreshed records.
    pub async fn check_all(&self) -> Vec<HealthRecord> {
        let probes = self.registry.enabled().map(|f| self.check_one(f));
        join_all(probes).await;

        let summary = self.health_summary();
        tracing::debug!(
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            "Health check round complete"
        );
        self.all_health()
    }

    /// Probe one facilitator and update its record. Disabled facilitators
    /// are not probed and yield `None`.
    pub async fn check_one(&self, facilitator: &Facilitator) -> Option<HealthRecord> {
        if !facilitator.is_enabled() {
            return None;
        }
        let started = Instant::now();
        let timeout = self.settings.probe_timeout;

        let outcome = match tokio::time::timeout(timeout, facilitator.client().supported()).await {
            Ok(Ok(reply)) if reply.is_success() => Ok(()),
            Ok(Ok(reply)) => Err(format!("HTTP {}", reply.status)),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(FacilitatorError::Timeout(timeout.as_millis() as u64).to_string()),
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(()) => self.record_success(facilitator.id(), elapsed),
            Err(error) => {
                self.log.log_error(
                    Operation::HealthCheck,
                    facilitator.id(),
                    facilitator.name(),
                    &error,
                    elapsed,
                    None,
                );
                self.record_failure(facilitator.id(), &error)
            }
        }
    }

    /// Returns `None` for ids that were never registered.
    pub fn record_success(&self, facilitator_id: &str, elapsed: Duration) -> Option<HealthRecord> {
        let mut record = self.records.get_mut(facilitator_id)?;
        let recovered = !record.is_healthy;

        record.is_healthy = true;
        record.consecutive_failures = 0;
        record.total_successes += 1;
        record.average_response_time_ms = Some(moving_average(
            record.average_response_time_ms,
            elapsed.as_millis() as f64,
        ));
        record.last_error = None;
        record.last_successful_check = Some(Utc::now());

        metrics::FACILITATOR_HEALTHY
            .with_label_values(&[facilitator_id])
            .set(1);
        if recovered {
            tracing::info!(facilitator = %facilitator_id, "Facilitator recovered");
        }
        Some(record.clone())
    }

    pub fn record_failure(&self, facilitator_id: &str, error: &str) -> Option<HealthRecord> {
        let mut record = self.records.get_mut(facilitator_id)?;

        record.consecutive_failures += 1;
        record.total_failures += 1;
        record.last_failed_check = Some(Utc::now());
        record.last_error = Some(error.to_string());

        if record.is_healthy && record.consecutive_failures >= self.settings.max_consecutive_failures
        {
            record.is_healthy = false;
            metrics::FACILITATOR_HEALTHY
                .with_label_values(&[facilitator_id])
                .set(0);
            tracing::warn!(
                facilitator = %facilitator_id,
                consecutive_failures = record.consecutive_failures,
                error = %error,
                "Facilitator marked unhealthy"
            );
        }
        Some(record.clone())
    }

    pub fn get_health(&self, facilitator_id: &str) -> Option<HealthRecord> {
        self.records.get(facilitator_id).map(|r| r.clone())
    }

    /// Unknown ids count as healthy.
    pub fn is_healthy(&self, facilitator_id: &str) -> bool {
        self.records
            .get(facilitator_id)
            .is_none_or(|r| r.is_healthy)
    }

    /// Records in registry order.
    pub fn all_health(&self) -> Vec<HealthRecord> {
        self.registry
            .all()
            .iter()
            .filter_map(|f| self.get_health(f.id()))
            .collect()
    }

    pub fn has_healthy_facilitator(&self) -> bool {
        self.records.iter().any(|r| r.is_healthy)
    }

    /// The healthy facilitator with the lowest average probe time.
    pub fn healthiest_facilitator(&self) -> Option<HealthRecord> {
        self.all_health()
            .into_iter()
            .filter(|r| r.is_healthy)
            .filter_map(|r| r.average_response_time_ms.map(|avg| (avg, r)))
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, r)| r)
    }

    pub fn health_summary(&self) -> HealthSummary {
        let records = self.all_health();
        let healthy = records.iter().filter(|r| r.is_healthy).count();
        let averages: Vec<f64> = records
            .iter()
            .filter_map(|r| r.average_response_time_ms)
            .collect();

        HealthSummary {
            total: records.len(),
            healthy,
            unhealthy: records.len() - healthy,
            total_successes: records.iter().map(|r| r.total_successes).sum(),
            total_failures: records.iter().map(|r| r.total_failures).sum(),
            average_response_time_ms: (!averages.is_empty())
                .then(|| averages.iter().sum::<f64>() / averages.len() as f64),
        }
    }

    /// Manual override. Marking healthy also clears the failure streak.
    pub fn set_health_status(&self, facilitator_id: &str, healthy: bool) -> bool {
        let Some(mut record) = self.records.get_mut(facilitator_id) else {
            return false;
        };
        record.is_healthy = healthy;
        if healthy {
            record.consecutive_failures = 0;
        }
        metrics::FACILITATOR_HEALTHY
            .with_label_values(&[facilitator_id])
            .set(i64::from(healthy));
        tracing::info!(facilitator = %facilitator_id, healthy, "Health status overridden");
        true
    }

    pub fn reset_stats(&self, facilitator_id: &str) -> bool {
        match self.records.get_mut(facilitator_id) {
            Some(mut record) => {
                *record = HealthRecord::new(facilitator_id);
                metrics::FACILITATOR_HEALTHY
                    .with_label_values(&[facilitator_id])
                    .set(1);
                true
            }
            None => false,
        }
    }

    pub fn reset_all_stats(&self) {
        for facilitator in self.registry.all() {
            self.reset_stats(facilitator.id());
        }
    }
}

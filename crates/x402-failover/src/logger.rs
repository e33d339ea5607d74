//! In-memory operation log and per-facilitator statistics.
//!
//! Every dispatch attempt and every failed health probe lands here. Entries
//! live in a bounded ring; statistics are derived incrementally as entries
//! arrive and are never persisted.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::{ALL_FACILITATORS_ID, EMA_WEIGHT, NO_FACILITATOR_ID};
use crate::facilitator::Operation;
use crate::settings::LogSettings;

/// Fold a new sample into an exponential moving average. The first sample seeds it.
pub fn moving_average(previous: Option<f64>, sample: f64) -> f64 {
    match previous {
        Some(avg) => avg * (1.0 - EMA_WEIGHT) + sample * EMA_WEIGHT,
        None => sample,
    }
}

/// Percentage, or `None` when there is nothing to divide by.
pub fn success_rate(successes: u64, failures: u64) -> Option<f64> {
    let total = successes + failures;
    (total > 0).then(|| successes as f64 / total as f64 * 100.0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    pub facilitator_id: String,
    pub facilitator_name: String,
    pub success: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationCounts {
    pub verify: u64,
    pub settle: u64,
    pub supported: u64,
    pub list: u64,
}

impl OperationCounts {
    fn bump(&mut self, op: Operation) {
        match op {
            Operation::Verify => self.verify += 1,
            Operation::Settle => self.settle += 1,
            Operation::Supported => self.supported += 1,
            Operation::List => self.list += 1,
            Operation::HealthCheck => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.verify + self.settle + self.supported + self.list
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    pub facilitator_id: String,
    pub facilitator_name: String,
    pub operations: OperationCounts,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_response_time_ms: Option<f64>,
    pub last_used: Option<DateTime<Utc>>,
}

impl StatsRecord {
    fn new(id: &str, name: &str) -> Self {
        Self {
            facilitator_id: id.to_string(),
            facilitator_name: name.to_string(),
            operations: OperationCounts::default(),
            success_count: 0,
            failure_count: 0,
            average_response_time_ms: None,
            last_used: None,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(&self.facilitator_id, &self.facilitator_name);
    }

    pub fn success_rate(&self) -> Option<f64> {
        success_rate(self.success_count, self.failure_count)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummary {
    pub total_operations: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    /// 0 when nothing has been recorded yet.
    pub success_rate: f64,
    pub average_response_time_ms: Option<f64>,
    pub facilitators_tracked: usize,
    pub total_log_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMetrics {
    pub window_minutes: u64,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_rate: Option<f64>,
    pub average_response_time_ms: Option<f64>,
}

/// Selects entries for [`OperationLog::logs_for`].
#[derive(Debug, Clone, Copy)]
pub enum LogFilter<'a> {
    Facilitator(&'a str),
    Operation(Operation),
}

pub struct OperationLog {
    settings: LogSettings,
    entries: Mutex<VecDeque<LogEntry>>,
    stats: DashMap<String, StatsRecord>,
}

impl OperationLog {
    /// Create the log with one zeroed statistics record per `(id, name)`.
    pub fn new<'a>(
        settings: LogSettings,
        facilitators: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let stats = DashMap::new();
        for (id, name) in facilitators {
            stats.insert(id.to_string(), StatsRecord::new(id, name));
        }
        Self {
            entries: Mutex::new(VecDeque::with_capacity(settings.max_entries.min(4096))),
            settings,
            stats,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn log_success(
        &self,
        operation: Operation,
        facilitator_id: &str,
        facilitator_name: &str,
        elapsed: Duration,
        context: Option<Map<String, Value>>,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;
        tracing::debug!(
            facilitator = %facilitator_id,
            operation = %operation,
            elapsed_ms,
            "Facilitator operation succeeded"
        );
        if !self.settings.enabled {
            return;
        }
        self.record(LogEntry {
            timestamp: Utc::now(),
            operation,
            facilitator_id: facilitator_id.to_string(),
            facilitator_name: facilitator_name.to_string(),
            success: true,
            response_time_ms: elapsed_ms,
            error: None,
            context,
        });
    }

    /// Record a failure. Always reaches `tracing`, even with the log disabled.
    pub fn log_error(
        &self,
        operation: Operation,
        facilitator_id: &str,
        facilitator_name: &str,
        error: &str,
        elapsed: Duration,
        context: Option<Map<String, Value>>,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;
        tracing::error!(
            facilitator = %facilitator_id,
            operation = %operation,
            elapsed_ms,
            error = %error,
            "Facilitator operation failed"
        );
        if !self.settings.enabled {
            return;
        }
        self.record(LogEntry {
            timestamp: Utc::now(),
            operation,
            facilitator_id: facilitator_id.to_string(),
            facilitator_name: facilitator_name.to_string(),
            success: false,
            response_time_ms: elapsed_ms,
            error: Some(error.to_string()),
            context,
        });
    }

    fn record(&self, entry: LogEntry) {
        self.update_stats(&entry);

        let max = self.settings.max_entries;
        let mut entries = self.entries();
        entries.push_back(entry);
        if entries.len() > max {
            // Drop a tenth at once so a full ring isn't trimmed on every insert.
            let excess = entries.len() - max;
            let batch = (max / 10).max(excess).min(entries.len());
            entries.drain(..batch);
        }
    }

    fn update_stats(&self, entry: &LogEntry) {
        let id = entry.facilitator_id.as_str();
        if id == NO_FACILITATOR_ID || id == ALL_FACILITATORS_ID {
            return;
        }
        let mut stats = self
            .stats
            .entry(id.to_string())
            .or_insert_with(|| StatsRecord::new(id, &entry.facilitator_name));

        stats.operations.bump(entry.operation);
        if entry.success {
            stats.success_count += 1;
        } else {
            stats.failure_count += 1;
        }
        stats.average_response_time_ms = Some(moving_average(
            stats.average_response_time_ms,
            entry.response_time_ms as f64,
        ));
        stats.last_used = Some(entry.timestamp);
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self, facilitator_id: &str) -> Option<StatsRecord> {
        self.stats.get(facilitator_id).map(|s| s.clone())
    }

    /// Every statistics record, ordered by facilitator id.
    pub fn all_stats(&self) -> Vec<StatsRecord> {
        let mut all: Vec<_> = self.stats.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.facilitator_id.cmp(&b.facilitator_id));
        all
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        self.entries().iter().rev().take(limit).cloned().collect()
    }

    /// Entries matching `filter`, newest first.
    pub fn logs_for(&self, filter: LogFilter<'_>, limit: Option<usize>) -> Vec<LogEntry> {
        let entries = self.entries();
        let matching = entries.iter().rev().filter(|e| match filter {
            LogFilter::Facilitator(id) => e.facilitator_id == id,
            LogFilter::Operation(op) => e.operation == op,
        });
        matching.take(limit.unwrap_or(usize::MAX)).cloned().collect()
    }

    pub fn logs_for_facilitator(&self, facilitator_id: &str, limit: Option<usize>) -> Vec<LogEntry> {
        self.logs_for(LogFilter::Facilitator(facilitator_id), limit)
    }

    pub fn logs_for_operation(&self, operation: Operation, limit: Option<usize>) -> Vec<LogEntry> {
        self.logs_for(LogFilter::Operation(operation), limit)
    }

    /// Failed entries, newest first.
    pub fn failed_logs(&self, limit: Option<usize>) -> Vec<LogEntry> {
        self.entries()
            .iter()
            .rev()
            .filter(|e| !e.success)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn overall_summary(&self) -> OverallSummary {
        let mut operations = 0;
        let mut successes = 0;
        let mut failures = 0;
        let mut averages = Vec::new();
        for stats in self.stats.iter() {
            operations += stats.operations.total();
            successes += stats.success_count;
            failures += stats.failure_count;
            if let Some(avg) = stats.average_response_time_ms {
                averages.push(avg);
            }
        }

        OverallSummary {
            total_operations: operations,
            total_successes: successes,
            total_failures: failures,
            success_rate: success_rate(successes, failures).unwrap_or(0.0),
            average_response_time_ms: mean(&averages),
            facilitators_tracked: self.stats.len(),
            total_log_entries: self.entries().len(),
        }
    }

    /// Aggregate entries from the last `minutes` minutes.
    pub fn metrics_by_time_window(&self, minutes: u64) -> WindowMetrics {
        let cutoff = Utc::now() - chrono::Duration::minutes(minutes as i64);
        let entries = self.entries();
        let recent: Vec<&LogEntry> = entries.iter().filter(|e| e.timestamp >= cutoff).collect();

        let successful = recent.iter().filter(|e| e.success).count();
        let failed = recent.len() - successful;
        let times: Vec<f64> = recent.iter().map(|e| e.response_time_ms as f64).collect();

        WindowMetrics {
            window_minutes: minutes,
            total_requests: recent.len(),
            successful_requests: successful,
            failed_requests: failed,
            success_rate: success_rate(successful as u64, failed as u64),
            average_response_time_ms: mean(&times),
        }
    }

    pub fn clear_logs(&self) {
        self.entries().clear();
        tracing::info!("Operation log cleared");
    }

    /// Zero one facilitator's statistics. The record itself stays.
    pub fn clear_stats(&self, facilitator_id: &str) -> bool {
        match self.stats.get_mut(facilitator_id) {
            Some(mut stats) => {
                stats.reset();
                true
            }
            None => false,
        }
    }

    pub fn clear_all_stats(&self) {
        for mut stats in self.stats.iter_mut() {
            stats.reset();
        }
        tracing::info!("Facilitator statistics cleared");
    }

    pub fn export_logs(&self) -> serde_json::Result<String> {
        let entries: Vec<LogEntry> = self.entries().iter().cloned().collect();
        serde_json::to_string_pretty(&entries)
    }

    pub fn export_stats(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.all_stats())
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::constants::{
    DEFAULT_HEALTH_CHECK_INTERVAL_MS, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_MAX_LOG_ENTRIES,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_TIMEOUT_MS,
};

/// How the dispatcher orders candidates relative to probe results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchOrdering {
    /// Strict priority order. Probe results are not consulted.
    #[default]
    Priority,
    /// Healthy candidates first, then unhealthy ones, each in priority order.
    HealthyFirst,
    /// Unhealthy candidates are skipped entirely.
    HealthyOnly,
}

impl FromStr for DispatchOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(DispatchOrdering::Priority),
            "healthy-first" => Ok(DispatchOrdering::HealthyFirst),
            "healthy-only" => Ok(DispatchOrdering::HealthyOnly),
            other => Err(format!(
                "unknown dispatch ordering '{other}' (expected priority, healthy-first or healthy-only)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSettings {
    pub enabled: bool,
    #[serde(serialize_with = "as_millis")]
    pub interval: Duration,
    #[serde(serialize_with = "as_millis")]
    pub probe_timeout: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(DEFAULT_HEALTH_CHECK_INTERVAL_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSettings {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_MAX_LOG_ENTRIES,
        }
    }
}

/// Global knobs shared by the dispatcher, health monitor and operation log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverSettings {
    #[serde(rename = "defaultTimeoutMs", serialize_with = "as_millis")]
    pub default_timeout: Duration,
    /// Attempts against one facilitator before moving to the next. At least 1.
    #[serde(rename = "retries")]
    pub retries_per_facilitator: u32,
    pub health_check: HealthCheckSettings,
    pub logging: LogSettings,
    pub ordering: DispatchOrdering,
}

impl Default for FailoverSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retries_per_facilitator: 1,
            health_check: HealthCheckSettings::default(),
            logging: LogSettings::default(),
            ordering: DispatchOrdering::default(),
        }
    }
}

impl FailoverSettings {
    /// Reject values that would make dispatch or probing meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_timeout.is_zero() {
            return Err("default timeout must be greater than zero".to_string());
        }
        if self.retries_per_facilitator == 0 {
            return Err("retries per facilitator must be at least 1".to_string());
        }
        if self.health_check.enabled {
            if self.health_check.interval.is_zero() {
                return Err("health check interval must be greater than zero".to_string());
            }
            if self.health_check.probe_timeout.is_zero() {
                return Err("probe timeout must be greater than zero".to_string());
            }
        }
        if self.health_check.max_consecutive_failures == 0 {
            return Err("max consecutive failures must be at least 1".to_string());
        }
        if self.logging.max_entries == 0 {
            return Err("max log entries must be at least 1".to_string());
        }
        Ok(())
    }
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

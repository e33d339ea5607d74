use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use std::sync::LazyLock;

pub static ATTEMPTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_failover_attempts_total",
        "Facilitator attempts made by the dispatcher",
        &["facilitator", "operation", "result"]
    )
    .unwrap()
});

pub static ATTEMPT_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "x402_failover_attempt_duration_seconds",
        "Facilitator attempt latency in seconds",
        &["facilitator", "operation"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap()
});

pub static EXHAUSTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_failover_exhausted_total",
        "Dispatches that ended without a usable facilitator reply",
        &["operation", "reason"]
    )
    .unwrap()
});

pub static FACILITATOR_HEALTHY: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        "x402_failover_facilitator_healthy",
        "1 if the last probes left the facilitator healthy, else 0",
        &["facilitator"]
    )
    .unwrap()
});

/// Text exposition of everything on the default registry.
pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

use prometheus::{register_int_counter_vec, IntCounterVec};
use std::sync::LazyLock;

pub use x402_failover::metrics::metrics_output;

/// Payment gate outcomes: `settled`, `required`, `rejected`, `unavailable`.
pub static PAYMENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_failover_server_payments_total",
        "Payment gate outcomes",
        &["result"]
    )
    .unwrap()
});

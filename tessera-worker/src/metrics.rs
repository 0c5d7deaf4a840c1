//! Instrumentation points for the processing core, emitted through the
//! `metrics` facade. The binary installs a Prometheus recorder; the core
//! never talks to the exporter directly.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use tessera_core::Outcome;

pub const EVENTS_TOTAL: &str = "worker_events_total";
pub const EVENT_DURATION_SECONDS: &str = "worker_event_duration_seconds";
pub const POLL_ERRORS_TOTAL: &str = "worker_poll_errors_total";
pub const POOL_SATURATED_TOTAL: &str = "worker_pool_saturated_total";
pub const WORKERS_ACTIVE: &str = "worker_pool_active";

/// Registers metric descriptions. Call once at startup.
pub fn describe() {
    describe_counter!(
        EVENTS_TOTAL,
        "Events processed, labelled by event type and outcome"
    );
    describe_histogram!(
        EVENT_DURATION_SECONDS,
        "End-to-end processing latency per event type, terminal outcomes only"
    );
    describe_counter!(POLL_ERRORS_TOTAL, "Failed queue receive calls");
    describe_counter!(
        POOL_SATURATED_TOTAL,
        "Events abandoned to redelivery because the worker pool was full"
    );
    describe_gauge!(WORKERS_ACTIVE, "Workers currently running in the pool");
}

pub fn record_outcome(event_type: &str, outcome: Outcome) {
    counter!(EVENTS_TOTAL, "type" => event_type.to_string(), "outcome" => outcome.as_str())
        .increment(1);
}

pub fn record_latency(event_type: &str, elapsed: Duration) {
    histogram!(EVENT_DURATION_SECONDS, "type" => event_type.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_poll_error() {
    counter!(POLL_ERRORS_TOTAL).increment(1);
}

pub fn record_pool_saturated() {
    counter!(POOL_SATURATED_TOTAL).increment(1);
}

pub fn set_workers_active(count: usize) {
    gauge!(WORKERS_ACTIVE).set(count as f64);
}

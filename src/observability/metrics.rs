//! Metrics collection.
//!
//! # Responsibilities
//! - Define client metrics (requests, latency, retries, transport errors,
//!   WebSocket connects)
//! - Record through the `metrics` facade; exporters are the application's
//!   choice
//!
//! # Metrics
//! - `kube_transport_requests_total` (counter): attempts by method, status
//! - `kube_transport_request_duration_seconds` (histogram): time to response
//!   headers by method
//! - `kube_transport_retries_total` (counter): resends by interceptor
//! - `kube_transport_transport_errors_total` (counter): engine failures by kind
//! - `kube_transport_websocket_connects_total` (counter): upgrade outcomes
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - A process-wide switch, set from `ObservabilityConfig::metrics_enabled`

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(true);

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// One transport attempt that produced a response.
pub fn record_request(method: &str, status: u16, start: Instant) {
    if !is_enabled() {
        return;
    }
    ::metrics::counter!(
        "kube_transport_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!(
        "kube_transport_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(interceptor: &str) {
    if !is_enabled() {
        return;
    }
    ::metrics::counter!("kube_transport_retries_total", "interceptor" => interceptor.to_string())
        .increment(1);
}

pub fn record_transport_error(kind: &'static str) {
    if !is_enabled() {
        return;
    }
    ::metrics::counter!("kube_transport_transport_errors_total", "kind" => kind).increment(1);
}

pub fn record_websocket_connect(outcome: &'static str) {
    if !is_enabled() {
        return;
    }
    ::metrics::counter!("kube_transport_websocket_connects_total", "outcome" => outcome).increment(1);
}

//! Metrics collection and exposition.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Initialize metrics exporter and server.
pub fn init_metrics(addr: SocketAddr) {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus recorder");

    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Count one proxied request by target and outcome.
pub fn record_request(target: &str, outcome: &'static str) {
    let labels = [
        ("target", target.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("redfish_proxy_requests_total", &labels).increment(1);
}

/// Record how long the upstream took to produce response headers.
pub fn record_upstream_latency(target: &str, seconds: f64) {
    histogram!("redfish_proxy_upstream_duration_seconds", "target" => target.to_string())
        .record(seconds);
}

/// Export the circuit state per target (0 closed, 1 half-open, 2 open).
pub fn record_circuit_state(target: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("redfish_proxy_circuit_state", "target" => target.to_string()).set(value);
}

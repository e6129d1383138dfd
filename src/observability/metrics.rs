//! Metrics collection and exposition.
//!
//! # Metrics
//! - `supervisor_service_server_up` (gauge): 1=probe passed, 0=probe failed,
//!   by service and target
//! - `supervisor_health_transitions_total` (counter): hysteresis boundary
//!   crossings by service and resulting state
//! - `supervisor_service_live` (gauge): 1 while a service balancer has at
//!   least one live target
//! - `supervisor_generations_total` (counter): configuration generations applied
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is optional and configured statically

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record the outcome of one probe.
pub fn record_server_up(service: &str, target: &str, up: bool) {
    metrics::gauge!(
        "supervisor_service_server_up",
        "service" => service.to_owned(),
        "target" => target.to_owned()
    )
    .set(if up { 1.0 } else { 0.0 });
}

/// Record a debounced liveness transition of a target.
pub fn record_transition(service: &str, up: bool) {
    metrics::counter!(
        "supervisor_health_transitions_total",
        "service" => service.to_owned(),
        "state" => if up { "up" } else { "down" }
    )
    .increment(1);
}

/// Record the aggregate liveness of a service balancer.
pub fn record_service_live(service: &str, live: bool) {
    metrics::gauge!("supervisor_service_live", "service" => service.to_owned())
        .set(if live { 1.0 } else { 0.0 });
}

pub fn record_generation() {
    metrics::counter!("supervisor_generations_total").increment(1);
}

//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define cluster metrics (endpoint liveness, probe timeouts, routing failures)
//! - Expose a Prometheus-compatible metrics endpoint for binaries
//!
//! # Metrics
//! - `sql_cluster_endpoint_up` (gauge): 1=connected, 0=down, per endpoint
//! - `sql_cluster_probe_timeouts_total` (counter): probes that hit the timeout
//! - `sql_cluster_active_replicas` (gauge): size of the active replica set
//! - `sql_cluster_routing_failures_total` (counter): by kind (reader, writer)
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels use connection names, never DSNs

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Which routing primitive failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingFailure {
    Reader,
    Writer,
}

impl RoutingFailure {
    fn as_str(self) -> &'static str {
        match self {
            RoutingFailure::Reader => "reader",
            RoutingFailure::Writer => "writer",
        }
    }
}

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    ::metrics::describe_gauge!("sql_cluster_endpoint_up", "1 if the last probe succeeded");
    ::metrics::describe_counter!("sql_cluster_probe_timeouts_total", "Probes abandoned at the timeout");
    ::metrics::describe_gauge!("sql_cluster_active_replicas", "Replicas eligible for reads");
    ::metrics::describe_counter!(
        "sql_cluster_routing_failures_total",
        "Calls rejected because no endpoint was available"
    );

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_endpoint_up(endpoint: &str, up: bool) {
    ::metrics::gauge!("sql_cluster_endpoint_up", "endpoint" => endpoint.to_string())
        .set(if up { 1.0 } else { 0.0 });
}

pub fn record_probe_timeout(endpoint: &str) {
    ::metrics::counter!("sql_cluster_probe_timeouts_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

pub fn record_active_replicas(count: usize) {
    ::metrics::gauge!("sql_cluster_active_replicas").set(count as f64);
}

pub fn record_routing_failure(kind: RoutingFailure) {
    ::metrics::counter!("sql_cluster_routing_failures_total", "kind" => kind.as_str()).increment(1);
}

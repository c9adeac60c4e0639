//! Metrics collection and exposition.
//!
//! # Metrics
//! - `porthole_requests_total` (counter): completed requests by method, status
//! - `porthole_request_duration_seconds` (histogram): latency distribution
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! deployments without a scrape endpoint pay nothing.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

pub const REQUESTS_TOTAL: &str = "porthole_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "porthole_request_duration_seconds";

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, latency: Duration) {
    counter!(REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(REQUEST_DURATION_SECONDS).record(latency.as_secs_f64());
}

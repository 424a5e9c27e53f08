//! Metrics collection and exposition.
//!
//! # Metrics
//! - `secure_port_connections_accepted_total` (counter)
//! - `secure_port_connections_shed_total` (counter): dropped at the pending-handshake cap
//! - `secure_port_handshakes_total` (counter): by `outcome` (`ok` or a handshake status code)
//! - `secure_port_handshake_duration_seconds` (histogram)
//! - `secure_port_handshakes_in_flight` (gauge)
//! - `secure_port_transports_total` (counter): by `outcome` (`created`, `rejected`, `discarded`)
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing unless the binary enables the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn connection_accepted() {
    metrics::counter!("secure_port_connections_accepted_total").increment(1);
}

pub fn connection_shed() {
    metrics::counter!("secure_port_connections_shed_total").increment(1);
}

pub fn handshake_started() {
    metrics::gauge!("secure_port_handshakes_in_flight").increment(1.0);
}

pub fn handshake_finished() {
    metrics::gauge!("secure_port_handshakes_in_flight").decrement(1.0);
}

/// Record a completed handshake; `outcome` is `ok` or the failure status.
pub fn record_handshake(outcome: &'static str, started: Instant) {
    metrics::counter!("secure_port_handshakes_total", "outcome" => outcome).increment(1);
    metrics::histogram!("secure_port_handshake_duration_seconds")
        .record(started.elapsed().as_secs_f64());
}

pub fn record_transport(outcome: &'static str) {
    metrics::counter!("secure_port_transports_total", "outcome" => outcome).increment(1);
}

//! Metrics export for the Agora server.
//!
//! The hub records through the `metrics` facade; this module describes
//! those metrics and installs the Prometheus exporter.

use agora_core::metrics::names;
use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Rejected WebSocket upgrades, by reason.
pub const UPGRADES_REJECTED: &str = "agora_upgrades_rejected_total";

/// Describe every metric the server and hub record.
pub fn init_metrics() {
    describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections registered since server start"
    );
    describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of registered connections"
    );
    describe_gauge!(names::USERS_ONLINE, "Current number of online users");
    describe_counter!(
        names::DISCONNECTS_TOTAL,
        "Connections removed from the registry, by reason"
    );
    describe_counter!(names::MESSAGES_ROUTED, "Events routed, by route class");
    describe_counter!(
        names::DELIVERIES_TOTAL,
        "Copies enqueued on outbound queues, by route class"
    );
    describe_counter!(
        names::DECODE_ERRORS_TOTAL,
        "Inbound frames or payloads that failed to decode"
    );
    describe_counter!(
        names::INTAKE_DROPS_TOTAL,
        "Collaborator events dropped on a full intake queue"
    );
    describe_counter!(names::PRESENCE_CHANGES_TOTAL, "Presence transitions");
    describe_counter!(UPGRADES_REJECTED, "Rejected WebSocket upgrades");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid metrics address {}:{}", host, port))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a rejected upgrade.
pub fn record_rejected_upgrade(reason: &'static str) {
    counter!(UPGRADES_REJECTED, "reason" => reason).increment(1);
}

//! Prometheus Exporter
//!
//! Publishes the outcome of the latest run: which alert types are
//! important (roots), the retained dependency edges and mean firing
//! durations.

use crate::error::MagnetError;
use dependency_analyzer::DependencyGraph;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use reduction::ReductionReport;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::info;

/// Start the HTTP exporter on `port`; requires a running tokio runtime
pub fn install_exporter(port: u16) -> Result<(), MagnetError> {
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .map_err(|e| MagnetError::Metrics(e.to_string()))?;

    describe_counter!("alertmagnet_query_attempts_total", "Range-query requests issued");
    describe_counter!("alertmagnet_query_failures_total", "Range queries that ended without a result");
    describe_counter!("alertmagnet_analyzing_count", "Completed analysis passes");
    describe_gauge!("alertmagnet_important_true", "1 for root alert types, 0 for suppressible ones");
    describe_gauge!("alertmagnet_dependency_overlap_ratio", "Overlap ratio of retained dependency edges");
    describe_gauge!("alertmagnet_mean_firing_seconds", "Mean firing interval length per alert type");

    info!("Metrics exporter listening on {}", address);
    Ok(())
}

/// Publish the gauges of one analysis pass
pub fn record_analysis(graph: &DependencyGraph, report: &ReductionReport) {
    counter!("alertmagnet_analyzing_count").increment(1);

    for alert in graph.nodes() {
        let important = if report.is_root(alert) { 1.0 } else { 0.0 };
        gauge!("alertmagnet_important_true", "alertname" => alert.to_string()).set(important);
    }

    for edge in graph.edges() {
        gauge!(
            "alertmagnet_dependency_overlap_ratio",
            "alertname" => edge.to_type.clone(),
            "depends_on" => edge.from_type.clone()
        )
        .set(edge.overlap_ratio);
    }

    for (alert, stats) in &report.durations {
        gauge!("alertmagnet_mean_firing_seconds", "alertname" => alert.clone()).set(stats.mean_firing_seconds);
    }
}

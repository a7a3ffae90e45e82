// src/metrics.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_ticks_total", "Poll ticks started, per source.");
        describe_counter!("poll_fetch_errors_total", "Venue fetches that failed.");
        describe_counter!(
            "poll_no_value_total",
            "Ticks skipped because no value could be extracted."
        );
        describe_counter!("poll_appends_total", "Readings appended to the log.");
        describe_counter!(
            "poll_append_errors_total",
            "Readings dropped because the append failed."
        );
        describe_histogram!("poll_fetch_ms", "Venue fetch time in milliseconds.");
        describe_gauge!("poll_last_value", "Most recently appended occupancy.");
        describe_gauge!(
            "poll_last_success_ts",
            "Unix ts of the most recent successful append."
        );
    });
}

/// Install the Prometheus recorder with its own HTTP listener.
/// Must run inside the tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("installing prometheus exporter on {addr}"))?;
    ensure_metrics_described();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}

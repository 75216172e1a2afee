//! Prometheus exporter for the worker.

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "accmask_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "accmask_run_duration_seconds";
}

/// Serve metrics on `0.0.0.0:{port}/metrics` for the lifetime of the process.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Port from `METRICS_PORT`, if set and valid.
pub fn metrics_port_from_env() -> Option<u16> {
    std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok())
}

/// Record one finished run.
pub fn record_run(strategy: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "failure" };
    let labels = [
        ("strategy", strategy.to_string()),
        ("status", status.to_string()),
    ];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, &labels).record(duration_secs);
}

// Prometheus recorder for the lock counters
// Counters are emitted by distlock-core through the `metrics` facade; the
// binary renders them to a text file for a node exporter textfile collector

use std::fs;
use std::path::Path;

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe every lock counter.
/// Should be called once at startup, before any lock is taken.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!("distlock_attempts_total", "Total number of quorum acquisition attempts");
    describe_counter!("distlock_acquired_total", "Total number of attempts that won a quorum");
    describe_counter!(
        "distlock_contended_total",
        "Total number of acquisitions that gave up after the wait budget"
    );
    describe_counter!(
        "distlock_cancelled_total",
        "Total number of acquisitions cancelled by the caller"
    );
    describe_counter!(
        "distlock_node_errors_total",
        "Total number of failed or timed out node calls, by node"
    );
    describe_counter!(
        "distlock_release_failures_total",
        "Total number of node releases that could not be confirmed, by node"
    );
}

/// Render the current counters into `path`.
///
/// Written to a sibling temp file first and renamed, so a collector never
/// reads a partial file.
pub fn write_metrics(handle: &PrometheusHandle, path: &Path) -> anyhow::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, handle.render())
        .with_context(|| format!("failed to write metrics to {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move metrics into {}", path.display()))?;
    Ok(())
}

//! Prometheus metrics for transfer jobs.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`
//! and defines the metric names the job runner records.  The CLI can dump the
//! rendered exposition text when a job finishes.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Finished transfer jobs (counter). Labels: outcome.
pub const TRANSFER_JOBS_TOTAL: &str = "azexplorer_transfer_jobs_total";

/// Status lines read from the engine (counter). Labels: kind.
pub const STATUS_LINES_TOTAL: &str = "azexplorer_status_lines_total";

/// Status validation warnings (counter).
pub const STATUS_WARNINGS_TOTAL: &str = "azexplorer_status_warnings_total";

/// Bytes reported as transferred by finished jobs (counter).
pub const BYTES_TRANSFERRED_TOTAL: &str = "azexplorer_bytes_transferred_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus recorder.  Idempotent.  Returns `None` if
/// another recorder was already installed by someone else.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install Prometheus recorder");
                None
            }
        })
        .as_ref()
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(TRANSFER_JOBS_TOTAL, "Finished transfer jobs by outcome");
    describe_counter!(STATUS_LINES_TOTAL, "Engine output lines by kind");
    describe_counter!(STATUS_WARNINGS_TOTAL, "Inconsistent status records");
    describe_counter!(BYTES_TRANSFERRED_TOTAL, "Bytes transferred by finished jobs");
}

/// Render the current metrics in Prometheus text format, if installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get()?.as_ref().map(|h| h.render())
}

// -- Recording helpers --------------------------------------------------------

pub(crate) fn record_line(kind: &'static str) {
    counter!(STATUS_LINES_TOTAL, "kind" => kind).increment(1);
}

pub(crate) fn record_warnings(count: usize) {
    if count > 0 {
        counter!(STATUS_WARNINGS_TOTAL).increment(count as u64);
    }
}

pub(crate) fn record_finished(outcome: &'static str, bytes: u64) {
    counter!(TRANSFER_JOBS_TOTAL, "outcome" => outcome).increment(1);
    counter!(BYTES_TRANSFERRED_TOTAL).increment(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_after_recording() {
        let handle = init_metrics().expect("recorder");
        describe_metrics();
        record_finished("succeeded", 1024);
        record_line("status");
        let text = handle.render();
        assert!(text.contains(TRANSFER_JOBS_TOTAL));
        assert!(render().is_some());
    }

    #[test]
    fn test_init_is_idempotent() {
        let a = init_metrics().map(|h| h as *const _);
        let b = init_metrics().map(|h| h as *const _);
        assert_eq!(a, b);
    }
}

//! Prometheus metrics helpers.
//!
//! Centralized metrics initialization and the metric descriptions shared by
//! the pipeline and the stream driver.
//!
//! # Usage
//!
//! ```rust,ignore
//! use geniza_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("firehose_commits_total").increment(1);
//! }
//! ```

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded. Returns
/// a handle for [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already
/// installed, instead of panicking. Useful for tests.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves `/metrics` on the given port from a background task and returns
/// immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    Ok(())
}

/// Register descriptions for the metrics this system records.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    describe_counter!(
        "firehose_frames_total",
        "Stream frames received, by kind (#commit / other / invalid)"
    );
    describe_counter!(
        "firehose_commits_total",
        "Commit events handed to the pipeline"
    );
    describe_counter!(
        "firehose_operations",
        "All operations seen on the firehose, by action and collection"
    );
    describe_counter!(
        "firehose_events_skipped_total",
        "Events skipped whole, by reason (too_big / bad_car)"
    );
    describe_counter!(
        "firehose_events_aborted_total",
        "Events whose remaining operations were abandoned, by reason"
    );
    describe_counter!(
        "firehose_events_failed_total",
        "Events whose processing returned an error to the driver"
    );
    describe_counter!(
        "firehose_ops_skipped_total",
        "Operations skipped by a filter gate, by reason"
    );
    describe_counter!(
        "posts_matched_total",
        "Posts that passed every gate and were emitted"
    );
    describe_gauge!(
        "firehose_lag_seconds",
        "Seconds between an event's wall-clock time and its processing"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();
        // At most one install can succeed.
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_register_common_metrics_does_not_panic() {
        ensure_metrics_init();
        register_common_metrics();
        register_common_metrics();
    }
}

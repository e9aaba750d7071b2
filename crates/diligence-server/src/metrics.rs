//! Prometheus metrics for `diligence-server`, registered onto the shared
//! `diligence-observability` global registry so they appear alongside the
//! workflow-level metrics on one `/metrics` endpoint.

use std::sync::OnceLock;

use diligence_observability::metrics_registry;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, TextEncoder};

struct ServerMetrics {
    requests_total: IntCounterVec,
    sessions_created_total: IntCounterVec,
    websocket_connections: IntGaugeVec,
}

static METRICS: OnceLock<ServerMetrics> = OnceLock::new();

#[allow(clippy::expect_used)]
fn get_or_init_metrics() -> &'static ServerMetrics {
    METRICS.get_or_init(|| {
        let global_registry = metrics_registry();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "diligence_server_requests_total",
                "Total number of HTTP requests by endpoint and status",
            ),
            &["endpoint", "status"],
        )
        .expect("failed to create requests_total");

        let sessions_created_total = IntCounterVec::new(
            Opts::new(
                "diligence_server_sessions_created_total",
                "Total number of due-diligence sessions created, by start transport",
            ),
            &["transport"],
        )
        .expect("failed to create sessions_created_total");

        let websocket_connections = IntGaugeVec::new(
            Opts::new(
                "diligence_server_websocket_connections",
                "Currently open WebSocket connections, by endpoint",
            ),
            &["endpoint"],
        )
        .expect("failed to create websocket_connections");

        global_registry
            .registry()
            .register(Box::new(requests_total.clone()))
            .expect("failed to register requests_total");
        global_registry
            .registry()
            .register(Box::new(sessions_created_total.clone()))
            .expect("failed to register sessions_created_total");
        global_registry
            .registry()
            .register(Box::new(websocket_connections.clone()))
            .expect("failed to register websocket_connections");

        ServerMetrics {
            requests_total,
            sessions_created_total,
            websocket_connections,
        }
    })
}

/// Record a completed HTTP request.
pub fn record_request(endpoint: &str, status: u16) {
    get_or_init_metrics()
        .requests_total
        .with_label_values(&[endpoint, &status.to_string()])
        .inc();
}

/// Record a new due-diligence session created via `transport` (`"stream"` or
/// `"run"`).
pub fn record_session_created(transport: &str) {
    get_or_init_metrics()
        .sessions_created_total
        .with_label_values(&[transport])
        .inc();
}

/// Track a WebSocket connection opening or closing on `endpoint`.
pub fn record_websocket_connection(endpoint: &str, delta: i64) {
    get_or_init_metrics()
        .websocket_connections
        .with_label_values(&[endpoint])
        .add(delta);
}

/// Renders the shared registry (this module's metrics plus every other
/// registered family) in the Prometheus text exposition format.
pub fn export() -> Result<String, prometheus::Error> {
    get_or_init_metrics();
    let metric_families = metrics_registry().registry().gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

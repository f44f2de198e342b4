//! Prometheus metrics for monitoring game server health.
//!
//! Metrics are exposed in Prometheus text format on their own listener, see
//! [`init_metrics`]. Recording is a no-op until an exporter is installed,
//! which keeps handlers and tests free of setup.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and duration
//! - **WebSocket Metrics**: Active connections, messages sent/received
//! - **Game Metrics**: Games created and finished, extractions submitted
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use uc_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/v1/games", 201);
//! metrics::games_created_total();
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use uncooperative::GameStatus;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Errors
///
/// Fails if the exporter can't bind `addr` or a recorder is already installed
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

pub fn websocket_connected() {
    metrics::counter!("websocket_connections_total").increment(1);
    metrics::gauge!("websocket_connections_active").increment(1.0);
}

pub fn websocket_disconnected() {
    metrics::gauge!("websocket_connections_active").decrement(1.0);
}

pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

// ============================================================================
// Game Metrics
// ============================================================================

pub fn games_created_total() {
    metrics::counter!("games_created_total").increment(1);
}

/// Set current active games count.
pub fn active_games(count: usize) {
    metrics::gauge!("active_games").set(count as f64);
}

pub fn extractions_submitted_total() {
    metrics::counter!("extractions_submitted_total").increment(1);
}

/// Count a game that just ended, labelled by outcome.
pub fn games_finished_total(status: GameStatus) {
    metrics::counter!("games_finished_total",
        "outcome" => status.to_string()
    )
    .increment(1);
}

/// Commands that failed because the snapshot store was down.
pub fn storage_failures_total() {
    metrics::counter!("storage_failures_total").increment(1);
}

// ============================================================================
// Rate Limiting Metrics
// ============================================================================

pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Counts of terminal events by kind
//! - **Errors**: Terminal error messages by code
//! - **Connection**: Session state gauge
//! - **Requests**: Historical data requests by outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::events::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder was already installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "tws_bridge_terminal_events_total",
        "Total events received from the trading terminal by kind"
    );
    describe_counter!(
        "tws_bridge_terminal_errors_total",
        "Total error messages received from the trading terminal by code"
    );
    describe_gauge!(
        "tws_bridge_connection_state",
        "Terminal session state (0 disconnected, 1 connecting, 2 connected)"
    );
    describe_counter!(
        "tws_bridge_historical_requests_total",
        "Total historical data requests by outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn state_value(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
    }
}

/// Update the session state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("tws_bridge_connection_state").set(state_value(state));
}

/// Record an event received from the terminal.
pub fn record_terminal_event(kind: &'static str) {
    counter!("tws_bridge_terminal_events_total", "kind" => kind).increment(1);
}

/// Record an error message received from the terminal.
pub fn record_terminal_error(code: i32) {
    counter!(
        "tws_bridge_terminal_errors_total",
        "code" => code.to_string()
    )
    .increment(1);
}

/// Record a historical data request attempt.
pub fn record_historical_request(outcome: &'static str) {
    counter!("tws_bridge_historical_requests_total", "outcome" => outcome).increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_gauge_values() {
        assert!(state_value(ConnectionState::Disconnected).abs() < f64::EPSILON);
        assert!((state_value(ConnectionState::Connecting) - 1.0).abs() < f64::EPSILON);
        assert!((state_value(ConnectionState::Connected) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        set_connection_state(ConnectionState::Connected);
        record_terminal_event("error");
        record_terminal_error(2104);
        record_historical_request("sent");
    }
}

//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Environment configuration.
pub mod config;

/// HTTP entry point (greeting, status, metrics).
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Signal handling and session teardown.
pub mod shutdown;

/// Logging and OpenTelemetry tracing setup.
pub mod telemetry;

/// TWS / IB Gateway socket client.
pub mod tws;

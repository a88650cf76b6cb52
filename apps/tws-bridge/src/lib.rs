#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! TWS Bridge - Trading Terminal Bootstrap Service
//!
//! Connects to Interactive Brokers' Trader Workstation or IB Gateway over
//! the TWS API socket protocol, waits for the session to become ready and
//! requests a fixed window of daily historical bars. A small HTTP server
//! stays up alongside the session.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Contracts, historical data requests/bars, session events
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `TerminalSession` interface
//!   - `services`: Session bootstrap
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `tws`: TWS wire protocol client
//!   - `config`: Environment configuration
//!   - `http`: Greeting, status and metrics endpoints
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! TWS / IB Gateway <--socket--> TwsClient --broadcast--> Bootstrapper listener
//!                                   |                         (logs)
//!                                   +--snapshot--> GET /status
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Plain data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::contract::{Contract, SecurityType};
pub use domain::events::{ConnectionState, TerminalError, TerminalEvent};
pub use domain::historical::{Bar, BarSize, HistoricalDataRequest, WhatToShow};

// Ports and services
pub use application::ports::{SessionError, SessionSnapshot, TerminalSession};
pub use application::services::{
    BootstrapError, BootstrapSettings, Bootstrapper, RequestOutcome, bootstrap_request,
};

// Infrastructure config
pub use infrastructure::config::{
    BridgeConfig, ConfigError, HttpSettings, Platform, TerminalSettings, TradingMode, load_dotenv,
};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, create_router};

// Terminal client
pub use infrastructure::tws::{TwsClient, TwsClientConfig, TwsClientError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

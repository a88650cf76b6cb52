//! TWS Bridge Binary
//!
//! Starts the HTTP server and bootstraps the trading terminal session.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tws-bridge
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TWS_PAPER_PORT` / `TWS_LIVE_PORT` / `IBGW_PAPER_PORT` / `IBGW_LIVE_PORT`:
//!   the one matching the selected platform and mode
//!
//! ## Optional
//! - `TWS_PLATFORM`: tws | gateway (default: tws)
//! - `TWS_TRADING_MODE`: paper | live (default: paper)
//! - `TWS_HOST`: terminal host (default: localhost)
//! - `CLIENT_ID`: API client id (default: 999)
//! - `HTTP_PORT`: HTTP listen port (default: 3000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tws_bridge::application::services::BOOTSTRAP_REQUEST_ID;
use tws_bridge::infrastructure::shutdown::{await_shutdown, close_session};
use tws_bridge::infrastructure::telemetry;
use tws_bridge::{
    AppState, BootstrapSettings, Bootstrapper, BridgeConfig, HttpServer, RequestOutcome,
    TerminalSession, TwsClient, TwsClientConfig, init_metrics, load_dotenv,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting TWS Bridge");

    let _metrics_handle = init_metrics();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let client = Arc::new(TwsClient::new(TwsClientConfig::new(
        config.terminal.host.clone(),
        config.terminal.port,
        config.terminal.client_id,
    )));
    let session: Arc<dyn TerminalSession> = client;

    let bootstrapper = Arc::new(Bootstrapper::new(
        Arc::clone(&session),
        BootstrapSettings::default(),
    ));

    let app_state = Arc::new(AppState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&session),
    ));
    let http_server = HttpServer::new(config.http.port, app_state, shutdown_token.clone());

    // bootstrap once the port is bound
    let bootstrap = Arc::clone(&bootstrapper);
    let server = http_server.run(move |_addr| {
        tokio::spawn(run_bootstrap(bootstrap));
    });
    tokio::pin!(server);

    let stopped_early = tokio::select! {
        result = &mut server => Some(result),
        () = await_shutdown(shutdown_token.clone()) => None,
    };
    let result = match stopped_early {
        Some(result) => result,
        // signal received; wait for graceful stop
        None => server.await,
    };

    close_session(session.as_ref(), BOOTSTRAP_REQUEST_ID).await;
    bootstrapper.shutdown();

    if let Err(e) = result {
        tracing::error!(error = %e, "HTTP server error");
        return Err(e.into());
    }

    tracing::info!("TWS Bridge stopped");
    Ok(())
}

/// Run the bootstrap and log its result.
async fn run_bootstrap(bootstrapper: Arc<Bootstrapper>) {
    match bootstrapper.initialize().await {
        Ok(RequestOutcome::Issued { request_id, bars }) => {
            tracing::info!(request_id, bars, "Bootstrap complete");
        }
        Ok(outcome) => {
            tracing::warn!(?outcome, "Bootstrap finished without data");
        }
        Err(e) => {
            tracing::error!(error = %e, "Bootstrap failed");
        }
    }
}

/// Log the resolved configuration.
fn log_config(config: &BridgeConfig) {
    tracing::info!(
        platform = config.terminal.platform.as_str(),
        trading_mode = config.terminal.trading_mode.as_str(),
        terminal = %config.terminal,
        client_id = config.terminal.client_id,
        http_port = config.http.port,
        "Configuration loaded"
    );
}
